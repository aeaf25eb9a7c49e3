use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Fixed ordered stages every simulated run passes through.
pub const STAGES: [&str; 5] = ["init", "build", "test", "deploy", "complete"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    /// pending -> running -> exactly one terminal state.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        match (self, next) {
            (ExecutionStatus::Pending, ExecutionStatus::Running) => true,
            (ExecutionStatus::Running, next) => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, serde_json::Value>>,
}

fn is_zero_f64(value: &f64) -> bool {
    *value == 0.0
}

fn is_zero_i64(value: &i64) -> bool {
    *value == 0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_duration: i64,
    pub stage_durations: HashMap<String, i64>,
    pub success_rate: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub cpu_usage: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub memory_usage: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub test_coverage: f64,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub build_size: i64,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub deployment_time: i64,
}

/// Reserved override for synthesized resource usage. Carried through the
/// run options but not consumed by metrics synthesis yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_usage: f64,
    pub memory_usage: f64,
}

/// Options controlling how a run is simulated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Advisory; per-stage randomized delays take precedence.
    pub total_duration: u64,
    /// Reserved.
    pub stage_durations: Option<HashMap<String, u64>>,
    /// Forced outcome. An empty string means no outcome is forced.
    #[serde(deserialize_with = "deserialize_forced_result")]
    pub result: Option<ExecutionStatus>,
    pub failure_stage: Option<String>,
    pub failure_reason: Option<String>,
    pub generate_metrics: bool,
    pub generate_logs: bool,
    pub resource_usage: Option<ResourceUsage>,
    pub ci_config_content: Option<String>,
}

fn deserialize_forced_result<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<ExecutionStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => {
            ExecutionStatus::deserialize(serde::de::value::StrDeserializer::new(raw.trim()))
                .map(Some)
        }
        _ => Ok(None),
    }
}

impl ExecutionOptions {
    /// Run profile the manager starts every execution with.
    pub fn default_profile() -> Self {
        Self {
            total_duration: 10,
            stage_durations: None,
            result: None,
            failure_stage: None,
            failure_reason: None,
            generate_metrics: true,
            generate_logs: true,
            resource_usage: Some(ResourceUsage {
                cpu_usage: 50.0,
                memory_usage: 60.0,
            }),
            ci_config_content: None,
        }
    }

    /// Overlay the fields a caller set at creation time onto `self`.
    pub fn merged_with(mut self, overrides: &ExecutionOptions) -> Self {
        if overrides.total_duration > 0 {
            self.total_duration = overrides.total_duration;
        }
        if overrides.stage_durations.is_some() {
            self.stage_durations = overrides.stage_durations.clone();
        }
        if overrides.result.is_some() {
            self.result = overrides.result;
        }
        if overrides.failure_stage.is_some() {
            self.failure_stage = overrides.failure_stage.clone();
        }
        if overrides.failure_reason.is_some() {
            self.failure_reason = overrides.failure_reason.clone();
        }
        if overrides.resource_usage.is_some() {
            self.resource_usage = overrides.resource_usage;
        }
        if overrides.ci_config_content.is_some() {
            self.ci_config_content = overrides.ci_config_content.clone();
        }
        self
    }

    /// Stage at which the run is forced to fail, if any.
    pub fn failure_target(&self) -> Option<&str> {
        if self.result == Some(ExecutionStatus::Success) {
            return None;
        }
        self.failure_stage
            .as_deref()
            .filter(|stage| !stage.is_empty())
    }

    pub fn failure_reason(&self) -> &str {
        self.failure_reason
            .as_deref()
            .filter(|reason| !reason.is_empty())
            .unwrap_or("simulated failure")
    }

    pub fn descriptor(&self) -> Option<&str> {
        self.ci_config_content
            .as_deref()
            .filter(|content| !content.trim().is_empty())
    }
}

/// Timestamps that are not set yet travel as the zero time
/// `0001-01-01T00:00:00Z` rather than `null`, and read back as unset.
mod zero_time {
    use chrono::{DateTime, Datelike, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => time.serialize(serializer),
            None => serializer.serialize_str(ZERO_TIME),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let time = Option::<DateTime<Utc>>::deserialize(deserializer)?;
        Ok(time.filter(|time| time.year() > 1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub project_id: String,
    pub platform: String,
    pub status: ExecutionStatus,
    #[serde(default, with = "zero_time")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, with = "zero_time")]
    pub end_time: Option<DateTime<Utc>>,
    pub duration: i64,
    pub trigger_type: String,
    pub trigger_info: HashMap<String, serde_json::Value>,
    pub platform_data: HashMap<String, serde_json::Value>,
    pub metrics: Metrics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogEntry>,
}

impl Execution {
    pub fn new(project_id: &str, platform: &str, trigger_type: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            platform: platform.to_string(),
            status: ExecutionStatus::Pending,
            start_time: None,
            end_time: None,
            duration: 0,
            trigger_type: trigger_type.to_string(),
            trigger_info: HashMap::new(),
            platform_data: HashMap::new(),
            metrics: Metrics::default(),
            logs: Vec::new(),
        }
    }

    fn transition(&mut self, next: ExecutionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidState(format!(
                "execution {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        if self.status != ExecutionStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "execution is not in pending status: {}",
                self.status
            )));
        }
        self.transition(ExecutionStatus::Running)?;
        self.start_time = Some(Utc::now());
        Ok(())
    }

    /// Move into a terminal state, stamping end time and duration once.
    pub fn finish(&mut self, status: ExecutionStatus) -> Result<()> {
        if self.status != ExecutionStatus::Running {
            return Err(AppError::InvalidState(format!(
                "execution is not running: {}",
                self.status
            )));
        }
        self.transition(status)?;

        let finished = Utc::now();
        self.end_time = Some(finished);
        if let Some(started) = self.start_time {
            self.duration = (finished - started).num_seconds();
        }
        Ok(())
    }

    pub fn add_log(
        &mut self,
        level: LogLevel,
        stage: &str,
        step: Option<String>,
        message: String,
    ) {
        self.logs.push(LogEntry {
            id: Uuid::new_v4().to_string(),
            execution_id: self.id.clone(),
            timestamp: Utc::now(),
            level,
            stage: stage.to_string(),
            step,
            message,
            context: None,
        });
    }
}
