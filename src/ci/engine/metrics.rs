//! Metrics synthesis - Derives run metrics from a job's resource profile
//!
//! The simulation has no real workload to sample, so usage figures are drawn
//! from the engine's random source and scaled against what the descriptor
//! requested. The configured-vs-actual comparison is published alongside the
//! typed metrics for downstream analysis.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

use crate::ci::descriptor::ResourceProfile;
use crate::ci::execution::Metrics;

/// Key under which the comparison is published in `platform_data`.
pub const RESOURCE_CONFIG_KEY: &str = "resource_config";

const BYTES_PER_MIB: i64 = 1024 * 1024;

/// Configured vs. synthesized usage for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsageComparison {
    pub limit: f64,
    pub request: f64,
    pub actual: f64,
    pub usage_percent: f64,
}

impl ResourceUsageComparison {
    fn new(request: f64, limit: f64, usage_percent: f64) -> Self {
        Self {
            limit,
            request,
            actual: usage_percent / 100.0 * request,
            usage_percent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceComparison {
    pub cpu: ResourceUsageComparison,
    pub memory: ResourceUsageComparison,
}

impl ResourceComparison {
    pub fn to_platform_data(&self) -> serde_json::Value {
        json!({
            "cpu": {
                "limit": self.cpu.limit,
                "request": self.cpu.request,
                "actual": self.cpu.actual,
                "usage_percent": self.cpu.usage_percent,
            },
            "memory": {
                "limit": self.memory.limit,
                "request": self.memory.request,
                "actual": self.memory.actual,
                "usage_percent": self.memory.usage_percent,
            },
        })
    }

    /// Read a published comparison back out of an execution's platform data.
    pub fn from_platform_data(platform_data: &HashMap<String, serde_json::Value>) -> Option<Self> {
        platform_data
            .get(RESOURCE_CONFIG_KEY)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// Everything a terminal transition writes besides status and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedMetrics {
    pub metrics: Metrics,
    pub resources: ResourceComparison,
}

pub fn synthesize<R: Rng + ?Sized>(
    rng: &mut R,
    profile: &ResourceProfile,
    success: bool,
    total_duration: i64,
    stage_durations: HashMap<String, i64>,
) -> SynthesizedMetrics {
    let cpu_usage = rng.gen_range(30.0..=95.0);
    let memory_usage = rng.gen_range(40.0..=95.0);
    let test_coverage = rng.gen_range(50.0..=95.0);
    let build_size = rng.gen_range(5..=100_i64) * BYTES_PER_MIB;
    let deployment_time = rng.gen_range(1..=10_i64);

    let metrics = Metrics {
        total_duration,
        stage_durations,
        success_rate: if success { 1.0 } else { 0.0 },
        cpu_usage,
        memory_usage,
        test_coverage,
        build_size,
        deployment_time,
    };

    let resources = ResourceComparison {
        cpu: ResourceUsageComparison::new(profile.cpu_request, profile.cpu_limit, cpu_usage),
        memory: ResourceUsageComparison::new(
            profile.memory_request,
            profile.memory_limit,
            memory_usage,
        ),
    };

    SynthesizedMetrics { metrics, resources }
}
