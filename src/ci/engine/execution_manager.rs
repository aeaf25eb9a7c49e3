//! Execution Manager - Binds platforms to engines and indexes executions
//!
//! The manager never holds live execution state. It keeps one handle per
//! execution (project, platform, creation options) in creation order and
//! routes every read and write through the engine bound to that platform.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{ExecutionEngine, ProviderEngine, SimulationConfig, SimulationEngine};
use crate::ci::execution::{Execution, ExecutionOptions};
use crate::error::{AppError, Result};

pub const MOCK_PLATFORM: &str = "mock";
pub const GITHUB_ACTIONS_PLATFORM: &str = "github_actions";

/// What the manager remembers about an execution it created.
#[derive(Debug, Clone)]
struct ExecutionHandle {
    execution_id: String,
    project_id: String,
    platform: String,
    /// Options supplied at creation, overlaid on the default run profile
    /// when the execution is started.
    options: ExecutionOptions,
    /// The record as it looked when it was created.
    created: Execution,
}

#[derive(Default)]
struct Registry {
    order: Vec<String>,
    handles: HashMap<String, ExecutionHandle>,
}

#[derive(Default)]
pub struct ExecutionManager {
    engines: RwLock<HashMap<String, Arc<dyn ExecutionEngine>>>,
    registry: RwLock<Registry>,
}

impl ExecutionManager {
    /// Create a manager with no engines bound
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager with the simulation engine on `mock` and the hosted provider
    /// placeholder on `github_actions`.
    pub async fn with_default_engines(config: &SimulationConfig) -> Self {
        let manager = Self::new();
        manager
            .register_engine(MOCK_PLATFORM, Arc::new(SimulationEngine::new(config.clone())))
            .await;
        manager
            .register_engine(GITHUB_ACTIONS_PLATFORM, Arc::new(ProviderEngine::github_actions()))
            .await;
        manager
    }

    /// Bind `platform` to `engine`, replacing any previous binding.
    pub async fn register_engine(&self, platform: impl Into<String>, engine: Arc<dyn ExecutionEngine>) {
        let platform = platform.into();
        info!(platform = %platform, "Registering execution engine");
        self.engines.write().await.insert(platform, engine);
    }

    /// Remove the engine bound to `platform`
    pub async fn unregister_engine(&self, platform: &str) -> Option<Arc<dyn ExecutionEngine>> {
        info!(platform = %platform, "Unregistering execution engine");
        self.engines.write().await.remove(platform)
    }

    /// List bound platforms
    pub async fn platforms(&self) -> Vec<String> {
        let mut platforms: Vec<String> = self.engines.read().await.keys().cloned().collect();
        platforms.sort();
        platforms
    }

    /// Create a pending execution on `platform`
    pub async fn create_execution(
        &self,
        project_id: &str,
        platform: &str,
        trigger_type: &str,
        options: ExecutionOptions,
    ) -> Result<String> {
        let engine = self
            .engines
            .read()
            .await
            .get(platform)
            .cloned()
            .ok_or_else(|| AppError::UnsupportedPlatform(platform.to_string()))?;

        let execution = Execution::new(project_id, platform, trigger_type);
        let execution_id = execution.id.clone();

        if let Some(registrar) = engine.registrar() {
            registrar.register_execution(execution.clone()).await?;
        }

        let handle = ExecutionHandle {
            execution_id: execution_id.clone(),
            project_id: project_id.to_string(),
            platform: platform.to_string(),
            options,
            created: execution,
        };

        {
            let mut registry = self.registry.write().await;
            registry.order.push(execution_id.clone());
            registry.handles.insert(execution_id.clone(), handle);
        }

        info!(
            execution_id = %execution_id,
            project_id = %project_id,
            platform = %platform,
            "Execution created"
        );
        Ok(execution_id)
    }

    /// Start a pending execution
    pub async fn start_execution(&self, execution_id: &str) -> Result<()> {
        let (handle, engine) = self.resolve(execution_id).await?;
        let options = ExecutionOptions::default_profile().merged_with(&handle.options);

        engine.execute(execution_id, options).await?;
        info!(execution_id = %execution_id, platform = %handle.platform, "Execution dispatched");
        Ok(())
    }

    /// Stop a running execution
    pub async fn stop_execution(&self, execution_id: &str) -> Result<()> {
        let (_, engine) = self.resolve(execution_id).await?;
        engine.stop(execution_id).await
    }

    /// Get an execution by ID
    pub async fn get_execution(&self, execution_id: &str) -> Result<Execution> {
        let (_, engine) = self.resolve(execution_id).await?;
        engine.get_status(execution_id).await
    }

    /// Executions of `project_id` in creation order, paginated. Engines that
    /// cannot report a record contribute it as it was created.
    pub async fn list_executions(
        &self,
        project_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Execution>> {
        let page: Vec<ExecutionHandle> = {
            let registry = self.registry.read().await;
            registry
                .order
                .iter()
                .filter_map(|id| registry.handles.get(id))
                .filter(|handle| handle.project_id == project_id)
                .skip(offset)
                .take(limit)
                .cloned()
                .collect()
        };

        let mut executions = Vec::with_capacity(page.len());
        for handle in page {
            let engine = self.engines.read().await.get(&handle.platform).cloned();
            let record = match engine {
                Some(engine) => match engine.get_status(&handle.execution_id).await {
                    Ok(execution) => execution,
                    Err(e) => {
                        debug!(
                            execution_id = %handle.execution_id,
                            error_kind = e.kind(),
                            "Listing created record: {}",
                            e
                        );
                        handle.created
                    }
                },
                None => handle.created,
            };
            executions.push(record);
        }

        Ok(executions)
    }

    async fn resolve(&self, execution_id: &str) -> Result<(ExecutionHandle, Arc<dyn ExecutionEngine>)> {
        let handle = self
            .registry
            .read()
            .await
            .handles
            .get(execution_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(execution_id.to_string()))?;

        let engine = self
            .engines
            .read()
            .await
            .get(&handle.platform)
            .cloned()
            .ok_or_else(|| AppError::EngineNotFound(handle.platform.clone()))?;

        Ok((handle, engine))
    }
}
