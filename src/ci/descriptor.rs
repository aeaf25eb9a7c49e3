//! CI descriptor parser
//!
//! Decodes the subset of a workflow file the simulation engine cares about:
//! jobs, their resource requests/limits and their ordered steps. Everything
//! else in the document (triggers, env, matrix...) is ignored.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashMap;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CIDescriptor {
    /// Jobs in document order.
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "runs-on", default)]
    pub runs_on: Option<String>,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub limits: ResourceSpec,
    #[serde(default)]
    pub requests: ResourceSpec,
}

/// Raw resource quantities. CPU may be a number or a numeric string; memory
/// is a magnitude with a unit suffix such as `4G` or `512Mi`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default)]
    pub cpu: Option<Value>,
    #[serde(default)]
    pub memory: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub run: Option<String>,
    #[serde(default)]
    pub uses: Option<String>,
    #[serde(default)]
    pub with: Option<HashMap<String, Value>>,
}

impl Step {
    /// Human readable label; unnamed steps fall back to their action, their
    /// command, then their position (1-based).
    pub fn display_name(&self, position: usize) -> String {
        [&self.name, &self.uses, &self.run]
            .into_iter()
            .flatten()
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("step-{}", position))
    }
}

impl CIDescriptor {
    pub fn parse(content: &str) -> Result<Self> {
        let yaml: Value = serde_yaml::from_str(content)?;

        let root = match &yaml {
            Value::Mapping(root) => root,
            Value::Null => return Ok(Self::default()),
            _ => {
                return Err(AppError::ParseFailure(
                    "descriptor root must be a mapping".to_string(),
                ))
            }
        };

        let jobs = match root.get("jobs") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Mapping(jobs)) => Self::parse_jobs(jobs)?,
            Some(_) => {
                return Err(AppError::ParseFailure(
                    "'jobs' must be a mapping of job name to job".to_string(),
                ))
            }
        };

        Ok(Self { jobs })
    }

    fn parse_jobs(jobs: &serde_yaml::Mapping) -> Result<Vec<Job>> {
        let mut parsed = Vec::with_capacity(jobs.len());

        for (job_name, job_config) in jobs {
            let name = job_name
                .as_str()
                .ok_or_else(|| AppError::ParseFailure("job names must be strings".to_string()))?;

            let mut job: Job = match job_config {
                Value::Null => Job::default(),
                config => serde_yaml::from_value(config.clone()).map_err(|e| {
                    AppError::ParseFailure(format!("job '{}': {}", name, e))
                })?,
            };
            job.name = name.to_string();
            parsed.push(job);
        }

        Ok(parsed)
    }

    pub fn first_job(&self) -> Option<&Job> {
        self.jobs.first()
    }

    /// First job, in document order, that declares at least one step.
    pub fn first_job_with_steps(&self) -> Option<&Job> {
        self.jobs.iter().find(|job| !job.steps.is_empty())
    }
}

/// Parse a CPU quantity: `2`, `1.5`, `"2"` or millicores such as `"500m"`.
pub fn parse_cpu(value: &Value) -> Option<f64> {
    let cores = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => {
            let text = text.trim();
            match text.strip_suffix('m') {
                Some(millis) => millis.trim().parse::<f64>().ok()? / 1000.0,
                None => text.parse::<f64>().ok()?,
            }
        }
        _ => return None,
    };

    (cores.is_finite() && cores >= 0.0).then_some(cores)
}

/// Parse a memory quantity into bytes. A bare number is a byte count.
pub fn parse_memory(value: &Value) -> Option<u64> {
    let text = match value {
        Value::Number(number) => return number.as_u64(),
        Value::String(text) => text.trim(),
        _ => return None,
    };

    let digits_end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    if digits_end == 0 {
        return None;
    }

    let magnitude: u64 = text[..digits_end].parse().ok()?;
    let multiplier: u64 = match text[digits_end..].trim() {
        "" | "B" => 1,
        "K" | "KB" | "Ki" => 1024,
        "M" | "MB" | "Mi" => 1024 * 1024,
        "G" | "GB" | "Gi" => 1024 * 1024 * 1024,
        "T" | "TB" | "Ti" => 1024 * 1024 * 1024 * 1024,
        _ => return None,
    };

    magnitude.checked_mul(multiplier)
}

/// Requested and limited resources of a job, CPU in cores and memory in
/// GiB. Missing or unparseable fields fall back to the defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceProfile {
    pub cpu_request: f64,
    pub cpu_limit: f64,
    pub memory_request: f64,
    pub memory_limit: f64,
}

impl Default for ResourceProfile {
    fn default() -> Self {
        Self {
            cpu_request: 1.0,
            cpu_limit: 2.0,
            memory_request: 2.0,
            memory_limit: 4.0,
        }
    }
}

impl ResourceProfile {
    pub fn from_job(job: &Job) -> Self {
        let defaults = Self::default();
        let cpu = |spec: &ResourceSpec, fallback: f64| {
            spec.cpu.as_ref().and_then(parse_cpu).unwrap_or(fallback)
        };
        let memory = |spec: &ResourceSpec, fallback: f64| {
            spec.memory
                .as_ref()
                .and_then(parse_memory)
                .map(|bytes| bytes as f64 / BYTES_PER_GIB)
                .unwrap_or(fallback)
        };

        Self {
            cpu_request: cpu(&job.resources.requests, defaults.cpu_request),
            cpu_limit: cpu(&job.resources.limits, defaults.cpu_limit),
            memory_request: memory(&job.resources.requests, defaults.memory_request),
            memory_limit: memory(&job.resources.limits, defaults.memory_limit),
        }
    }

    pub fn from_descriptor(descriptor: Option<&CIDescriptor>) -> Self {
        descriptor
            .and_then(CIDescriptor::first_job)
            .map(Self::from_job)
            .unwrap_or_default()
    }
}
