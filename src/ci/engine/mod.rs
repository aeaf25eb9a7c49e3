//! Execution engines
//!
//! An engine drives executions for one platform. The manager only ever talks
//! to engines through [`ExecutionEngine`]; adding a platform means registering
//! another implementation, never touching the manager.

pub mod execution_manager;
pub mod metrics;
pub mod provider;
pub mod simulation;

use async_trait::async_trait;

use crate::ci::execution::{Execution, ExecutionOptions};
use crate::error::Result;

pub use execution_manager::ExecutionManager;
pub use metrics::{ResourceComparison, ResourceUsageComparison};
pub use provider::ProviderEngine;
pub use simulation::{DelayRange, SimulationConfig, SimulationEngine};

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Move a pending execution to running and dispatch its work. Returns
    /// once the work is dispatched, not when it finishes.
    async fn execute(&self, execution_id: &str, options: ExecutionOptions) -> Result<()>;

    /// Request cancellation of a running execution.
    async fn stop(&self, execution_id: &str) -> Result<()>;

    /// Snapshot of the execution. Callers own the returned copy.
    async fn get_status(&self, execution_id: &str) -> Result<Execution>;

    /// Engines that keep executions in-process expose a registrar so newly
    /// created records can be handed over.
    fn registrar(&self) -> Option<&dyn ExecutionRegistrar> {
        None
    }
}

#[async_trait]
pub trait ExecutionRegistrar: Send + Sync {
    async fn register_execution(&self, execution: Execution) -> Result<()>;
}
