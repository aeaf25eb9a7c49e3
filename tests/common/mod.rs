#![allow(dead_code)]

use pipeline_orchestrator::ci::engine::{DelayRange, SimulationConfig};
use pipeline_orchestrator::ci::{Execution, ExecutionManager};
use std::time::Duration;

pub const GO_WORKFLOW: &str = r#"
name: CI
on:
  push:
    branches: [ main ]
jobs:
  build:
    runs-on: ubuntu-latest
    resources:
      limits:
        cpu: 2
        memory: 4G
      requests:
        cpu: 1
        memory: 2G
    steps:
    - uses: actions/checkout@v2
    - name: Set up Go
      uses: actions/setup-go@v2
      with:
        go-version: 1.20
    - name: Build
      run: go build -v ./...
    - name: Test
      run: go test -v ./...
"#;

pub fn fast_config() -> SimulationConfig {
    SimulationConfig {
        stage_delay: DelayRange::new(1, 3),
        step_delay: DelayRange::new(1, 2),
        seed: None,
    }
}

pub fn slow_config() -> SimulationConfig {
    SimulationConfig {
        stage_delay: DelayRange::new(30_000, 30_000),
        step_delay: DelayRange::new(30_000, 30_000),
        seed: None,
    }
}

pub async fn wait_for_terminal(manager: &ExecutionManager, execution_id: &str) -> Execution {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let execution = manager.get_execution(execution_id).await.unwrap();
            if execution.status.is_terminal() {
                return execution;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("execution did not reach a terminal state")
}
