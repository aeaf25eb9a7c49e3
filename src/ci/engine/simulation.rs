//! Simulation Engine - Drives executions through the fixed stage list in-process
//!
//! Each run gets one tokio task. The task walks `init, build, test, deploy,
//! complete`, expanding build/test into the steps of the descriptor's first
//! job, and finally writes a terminal status together with synthesized
//! metrics. All mutation happens under the engine's table lock, which is never
//! held across a delay.
//!
//! Cancellation is signalled through a per-run [`CancellationToken`]: every
//! delay races the token, and every log append re-checks that the run is
//! still running, so nothing is appended after a stop has been recorded.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::metrics::{self, SynthesizedMetrics, RESOURCE_CONFIG_KEY};
use super::{ExecutionEngine, ExecutionRegistrar};
use crate::ci::descriptor::{CIDescriptor, ResourceProfile, Step};
use crate::ci::execution::{Execution, ExecutionOptions, ExecutionStatus, LogLevel, STAGES};
use crate::error::{AppError, Result};

/// Inclusive range of simulated delay, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let millis = if self.max_ms <= self.min_ms {
            self.min_ms
        } else {
            rng.gen_range(self.min_ms..=self.max_ms)
        };
        Duration::from_millis(millis)
    }
}

impl FromStr for DelayRange {
    type Err = AppError;

    /// Accepts `min-max` or a single fixed value, both in milliseconds.
    fn from_str(value: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.trim().parse::<u64>().map_err(|_| {
                AppError::ConfigError(format!("invalid delay '{}', expected milliseconds", value))
            })
        };

        let range = match value.split_once('-') {
            Some((min, max)) => Self::new(parse(min)?, parse(max)?),
            None => {
                let fixed = parse(value)?;
                Self::new(fixed, fixed)
            }
        };

        if range.min_ms > range.max_ms {
            return Err(AppError::ConfigError(format!(
                "invalid delay '{}', min exceeds max",
                value
            )));
        }
        Ok(range)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Generic work per stage.
    pub stage_delay: DelayRange,
    /// Work per descriptor step in build/test.
    pub step_delay: DelayRange,
    /// Fixed seed for reproducible runs; entropy when unset.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            stage_delay: DelayRange::new(1000, 3000),
            step_delay: DelayRange::new(1000, 2000),
            seed: None,
        }
    }
}

struct TrackedExecution {
    execution: Execution,
    cancel: CancellationToken,
}

struct EngineState {
    config: SimulationConfig,
    executions: RwLock<HashMap<String, TrackedExecution>>,
    rng: Mutex<StdRng>,
}

impl EngineState {
    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn draw_delay(&self, range: DelayRange) -> Duration {
        range.sample(&mut *self.rng())
    }
}

/// In-process engine that simulates pipeline runs.
#[derive(Clone)]
pub struct SimulationEngine {
    state: Arc<EngineState>,
}

impl SimulationEngine {
    /// Create an engine, seeding its random source from `config`
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            state: Arc::new(EngineState {
                config,
                executions: RwLock::new(HashMap::new()),
                rng: Mutex::new(rng),
            }),
        }
    }

}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

#[async_trait]
impl ExecutionRegistrar for SimulationEngine {
    async fn register_execution(&self, execution: Execution) -> Result<()> {
        let mut executions = self.state.executions.write().await;
        if executions.contains_key(&execution.id) {
            return Err(AppError::InvalidState(format!(
                "execution already registered: {}",
                execution.id
            )));
        }

        debug!(execution_id = %execution.id, "Execution registered with simulation engine");
        executions.insert(
            execution.id.clone(),
            TrackedExecution {
                execution,
                cancel: CancellationToken::new(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl ExecutionEngine for SimulationEngine {
    async fn execute(&self, execution_id: &str, options: ExecutionOptions) -> Result<()> {
        let cancel = {
            let mut executions = self.state.executions.write().await;
            let tracked = executions
                .get_mut(execution_id)
                .ok_or_else(|| AppError::NotFound(execution_id.to_string()))?;
            tracked.execution.start()?;
            tracked.cancel.clone()
        };

        info!(execution_id = %execution_id, "Simulated execution started");

        let run = SimulationRun {
            state: self.state.clone(),
            execution_id: execution_id.to_string(),
            options,
            cancel,
        };
        tokio::spawn(run.drive());

        Ok(())
    }

    async fn stop(&self, execution_id: &str) -> Result<()> {
        let mut executions = self.state.executions.write().await;
        let tracked = executions
            .get_mut(execution_id)
            .ok_or_else(|| AppError::NotFound(execution_id.to_string()))?;

        tracked.execution.finish(ExecutionStatus::Cancelled)?;
        tracked.execution.add_log(
            LogLevel::Info,
            "cancellation",
            None,
            "Execution cancelled by user".to_string(),
        );
        tracked.cancel.cancel();

        info!(execution_id = %execution_id, "Simulated execution cancelled");
        Ok(())
    }

    async fn get_status(&self, execution_id: &str) -> Result<Execution> {
        let executions = self.state.executions.read().await;
        executions
            .get(execution_id)
            .map(|tracked| tracked.execution.clone())
            .ok_or_else(|| AppError::NotFound(execution_id.to_string()))
    }

    fn registrar(&self) -> Option<&dyn ExecutionRegistrar> {
        Some(self)
    }
}

enum RunOutcome<'a> {
    Succeeded,
    Failed { stage: &'a str, reason: &'a str },
}

/// State owned by one background run.
struct SimulationRun {
    state: Arc<EngineState>,
    execution_id: String,
    options: ExecutionOptions,
    cancel: CancellationToken,
}

impl SimulationRun {
    async fn drive(self) {
        let descriptor = match self.options.descriptor().map(CIDescriptor::parse) {
            None => None,
            Some(Ok(descriptor)) => Some(descriptor),
            Some(Err(e)) => {
                warn!(execution_id = %self.execution_id, "Ignoring CI descriptor: {}", e);
                let message = format!("{}; falling back to default resources", e);
                if !self.log(LogLevel::Warn, "init", None, message).await {
                    return;
                }
                None
            }
        };

        let profile = ResourceProfile::from_descriptor(descriptor.as_ref());
        let steps: &[Step] = descriptor
            .as_ref()
            .and_then(CIDescriptor::first_job_with_steps)
            .map(|job| job.steps.as_slice())
            .unwrap_or(&[]);
        let failure_target = self.options.failure_target();
        let mut stage_durations = HashMap::new();

        for stage in STAGES {
            if !self.is_running().await {
                debug!(execution_id = %self.execution_id, stage, "Run no longer active");
                return;
            }

            if !self
                .log(LogLevel::Info, stage, None, format!("Starting {} stage", stage))
                .await
            {
                return;
            }
            debug!(execution_id = %self.execution_id, stage, "Stage started");

            let stage_started = Instant::now();
            let fails_here = failure_target == Some(stage);

            if matches!(stage, "build" | "test") && !steps.is_empty() {
                for (index, step) in steps.iter().enumerate() {
                    let position = index + 1;
                    let tag = format!("step-{}", position);
                    let name = step.display_name(position);

                    if !self
                        .log(
                            LogLevel::Info,
                            stage,
                            Some(tag.clone()),
                            format!("Starting step: {}", name),
                        )
                        .await
                    {
                        return;
                    }

                    let delay = self.state.draw_delay(self.state.config.step_delay);
                    if !self.pause(delay).await {
                        return;
                    }

                    if !self
                        .log(
                            LogLevel::Info,
                            stage,
                            Some(tag),
                            format!("Completed step: {} in {} seconds", name, delay.as_secs()),
                        )
                        .await
                    {
                        return;
                    }

                    if fails_here {
                        stage_durations.insert(stage.to_string(), elapsed_secs(stage_started));
                        self.finish(self.failure(stage), &profile, stage_durations)
                            .await;
                        return;
                    }
                }
            } else {
                let delay = self.state.draw_delay(self.state.config.stage_delay);
                if !self.pause(delay).await {
                    return;
                }
            }

            let elapsed = elapsed_secs(stage_started);
            stage_durations.insert(stage.to_string(), elapsed);

            if fails_here {
                self.finish(self.failure(stage), &profile, stage_durations)
                    .await;
                return;
            }

            if !self
                .log(
                    LogLevel::Info,
                    stage,
                    None,
                    format!("Completed {} stage in {} seconds", stage, elapsed),
                )
                .await
            {
                return;
            }
        }

        self.finish(RunOutcome::Succeeded, &profile, stage_durations)
            .await;
    }

    fn failure<'a>(&'a self, stage: &'a str) -> RunOutcome<'a> {
        RunOutcome::Failed {
            stage,
            reason: self.options.failure_reason(),
        }
    }

    async fn is_running(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let executions = self.state.executions.read().await;
        executions
            .get(&self.execution_id)
            .map(|tracked| tracked.execution.status == ExecutionStatus::Running)
            .unwrap_or(false)
    }

    /// Sleep for `delay` unless the run is cancelled first.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Append a log entry if the run is still running. Returns false once the
    /// run has been stopped, which tells the caller to bail out.
    async fn log(&self, level: LogLevel, stage: &str, step: Option<String>, message: String) -> bool {
        let mut executions = self.state.executions.write().await;
        match executions.get_mut(&self.execution_id) {
            Some(tracked) if tracked.execution.status == ExecutionStatus::Running => {
                tracked.execution.add_log(level, stage, step, message);
                true
            }
            _ => false,
        }
    }

    async fn finish(
        &self,
        outcome: RunOutcome<'_>,
        profile: &ResourceProfile,
        stage_durations: HashMap<String, i64>,
    ) {
        let mut executions = self.state.executions.write().await;
        let Some(tracked) = executions.get_mut(&self.execution_id) else {
            return;
        };
        let execution = &mut tracked.execution;

        let (status, success) = match outcome {
            RunOutcome::Succeeded => (ExecutionStatus::Success, true),
            RunOutcome::Failed { .. } => (ExecutionStatus::Failed, false),
        };

        if let Err(e) = execution.finish(status) {
            debug!(execution_id = %self.execution_id, "Skipping terminal write: {}", e);
            return;
        }

        match outcome {
            RunOutcome::Succeeded => {
                let message = format!(
                    "Execution completed successfully in {} seconds",
                    execution.duration
                );
                execution.add_log(LogLevel::Info, "complete", None, message);
                info!(execution_id = %self.execution_id, duration = execution.duration, "Simulated execution succeeded");
            }
            RunOutcome::Failed { stage, reason } => {
                let message = format!("Failed at {} stage: {}", stage, reason);
                execution.add_log(LogLevel::Error, stage, None, message);
                info!(execution_id = %self.execution_id, stage, reason, "Simulated execution failed");
            }
        }

        let SynthesizedMetrics { metrics, resources } = metrics::synthesize(
            &mut *self.state.rng(),
            profile,
            success,
            execution.duration,
            stage_durations,
        );
        execution.metrics = metrics;
        execution
            .platform_data
            .insert(RESOURCE_CONFIG_KEY.to_string(), resources.to_platform_data());
    }
}

fn elapsed_secs(started: Instant) -> i64 {
    started.elapsed().as_secs() as i64
}
