mod common;

use pipeline_orchestrator::ci::engine::execution_manager::MOCK_PLATFORM;
use pipeline_orchestrator::ci::engine::ResourceComparison;
use pipeline_orchestrator::ci::{ExecutionManager, ExecutionOptions, ExecutionStatus, LogLevel};
use pipeline_orchestrator::AppError;
use std::time::Duration;
use common::{fast_config, slow_config, wait_for_terminal, GO_WORKFLOW};

fn workflow_options() -> ExecutionOptions {
    ExecutionOptions {
        ci_config_content: Some(GO_WORKFLOW.to_string()),
        ..ExecutionOptions::default()
    }
}

#[tokio::test]
async fn test_completed_run_publishes_resource_comparison() {
    let manager = ExecutionManager::with_default_engines(&fast_config()).await;
    let id = manager
        .create_execution("project-1", MOCK_PLATFORM, "manual", workflow_options())
        .await
        .unwrap();
    manager.start_execution(&id).await.unwrap();

    let execution = wait_for_terminal(&manager, &id).await;
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(execution.metrics.success_rate, 1.0);
    assert!(execution.start_time.is_some());
    assert!(execution.end_time >= execution.start_time);
    assert_eq!(execution.metrics.total_duration, execution.duration);

    let resources = ResourceComparison::from_platform_data(&execution.platform_data)
        .expect("resource comparison published");
    assert_eq!(resources.cpu.request, 1.0);
    assert_eq!(resources.cpu.limit, 2.0);
    assert_eq!(resources.memory.request, 2.0);
    assert_eq!(resources.memory.limit, 4.0);
    assert!((30.0..=95.0).contains(&resources.cpu.usage_percent));
    assert!((40.0..=95.0).contains(&resources.memory.usage_percent));

    let step_names: Vec<&str> = execution
        .logs
        .iter()
        .filter(|entry| entry.stage == "build" && entry.message.starts_with("Starting step"))
        .map(|entry| entry.message.as_str())
        .collect();
    assert_eq!(
        step_names,
        vec![
            "Starting step: actions/checkout@v2",
            "Starting step: Set up Go",
            "Starting step: Build",
            "Starting step: Test",
        ]
    );
}

#[tokio::test]
async fn test_start_twice_fails_second_time() {
    let manager = ExecutionManager::with_default_engines(&slow_config()).await;
    let id = manager
        .create_execution("project-1", MOCK_PLATFORM, "manual", ExecutionOptions::default())
        .await
        .unwrap();

    manager.start_execution(&id).await.unwrap();
    assert_eq!(
        manager.get_execution(&id).await.unwrap().status,
        ExecutionStatus::Running
    );
    assert!(matches!(
        manager.start_execution(&id).await,
        Err(AppError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_stop_only_while_running() {
    let manager = ExecutionManager::with_default_engines(&fast_config()).await;
    let id = manager
        .create_execution("project-1", MOCK_PLATFORM, "manual", ExecutionOptions::default())
        .await
        .unwrap();

    assert!(matches!(
        manager.stop_execution(&id).await,
        Err(AppError::InvalidState(_))
    ));

    manager.start_execution(&id).await.unwrap();
    let finished = wait_for_terminal(&manager, &id).await;
    assert_eq!(finished.status, ExecutionStatus::Success);

    assert!(matches!(
        manager.stop_execution(&id).await,
        Err(AppError::InvalidState(_))
    ));
    let after = manager.get_execution(&id).await.unwrap();
    assert_eq!(after.status, ExecutionStatus::Success);
    assert_eq!(after.end_time, finished.end_time);
    assert_eq!(after.duration, finished.duration);
    assert_eq!(after.logs.len(), finished.logs.len());
}

#[tokio::test]
async fn test_stop_running_execution() {
    let manager = ExecutionManager::with_default_engines(&slow_config()).await;
    let id = manager
        .create_execution("project-1", MOCK_PLATFORM, "manual", workflow_options())
        .await
        .unwrap();
    manager.start_execution(&id).await.unwrap();
    manager.stop_execution(&id).await.unwrap();

    let cancelled = manager.get_execution(&id).await.unwrap();
    assert_eq!(cancelled.status, ExecutionStatus::Cancelled);
    assert!(cancelled.end_time.is_some());
    let last = cancelled.logs.last().unwrap();
    assert_eq!(last.level, LogLevel::Info);
    assert_eq!(last.stage, "cancellation");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let later = manager.get_execution(&id).await.unwrap();
    assert_eq!(later.status, ExecutionStatus::Cancelled);
    assert_eq!(later.logs, cancelled.logs);
    assert_eq!(later.end_time, cancelled.end_time);
}

#[tokio::test]
async fn test_snapshot_is_independent() {
    let manager = ExecutionManager::with_default_engines(&fast_config()).await;
    let id = manager
        .create_execution("project-1", MOCK_PLATFORM, "manual", ExecutionOptions::default())
        .await
        .unwrap();
    manager.start_execution(&id).await.unwrap();
    let finished = wait_for_terminal(&manager, &id).await;

    let mut snapshot = manager.get_execution(&id).await.unwrap();
    snapshot.logs.clear();
    snapshot.status = ExecutionStatus::Pending;
    snapshot.platform_data.clear();

    let fresh = manager.get_execution(&id).await.unwrap();
    assert_eq!(fresh, finished);
    assert!(!fresh.logs.is_empty());
}

#[tokio::test]
async fn test_list_executions_pagination() {
    let manager = ExecutionManager::with_default_engines(&slow_config()).await;
    for index in 0..14 {
        let project = if index % 7 == 0 { "other" } else { "pid" };
        manager
            .create_execution(project, MOCK_PLATFORM, "manual", ExecutionOptions::default())
            .await
            .unwrap();
    }

    let page = manager.list_executions("pid", 10, 0).await.unwrap();
    assert_eq!(page.len(), 10);
    assert!(page.iter().all(|execution| execution.project_id == "pid"));

    let rest = manager.list_executions("pid", 10, 10).await.unwrap();
    assert_eq!(rest.len(), 2);
    assert!(page.iter().all(|first| rest.iter().all(|second| first.id != second.id)));

    assert!(manager.list_executions("pid", 10, 12).await.unwrap().is_empty());
    assert!(manager.list_executions("pid", 10, 50).await.unwrap().is_empty());
    assert_eq!(manager.list_executions("other", 10, 0).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_injected_failure_at_test_stage() {
    let manager = ExecutionManager::with_default_engines(&fast_config()).await;
    let options = ExecutionOptions {
        failure_stage: Some("test".to_string()),
        failure_reason: Some("flaky integration suite".to_string()),
        ..workflow_options()
    };
    let id = manager
        .create_execution("project-1", MOCK_PLATFORM, "manual", options)
        .await
        .unwrap();
    manager.start_execution(&id).await.unwrap();

    let execution = wait_for_terminal(&manager, &id).await;
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.metrics.success_rate, 0.0);

    let error_index = execution
        .logs
        .iter()
        .position(|entry| entry.level == LogLevel::Error && entry.stage == "test")
        .expect("error entry for the test stage");
    assert_eq!(
        execution.logs[error_index].message,
        "Failed at test stage: flaky integration suite"
    );
    assert!(!execution.logs[..error_index]
        .iter()
        .any(|entry| entry.stage == "deploy" || entry.stage == "complete"));
    assert_eq!(error_index, execution.logs.len() - 1);

    assert!(ResourceComparison::from_platform_data(&execution.platform_data).is_some());
}

#[tokio::test]
async fn test_injected_failure_at_plain_stage_uses_default_reason() {
    let manager = ExecutionManager::with_default_engines(&fast_config()).await;
    let options = ExecutionOptions {
        failure_stage: Some("deploy".to_string()),
        ..ExecutionOptions::default()
    };
    let id = manager
        .create_execution("project-1", MOCK_PLATFORM, "manual", options)
        .await
        .unwrap();
    manager.start_execution(&id).await.unwrap();

    let execution = wait_for_terminal(&manager, &id).await;
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.metrics.success_rate, 0.0);

    let last = execution.logs.last().unwrap();
    assert_eq!(last.level, LogLevel::Error);
    assert_eq!(last.stage, "deploy");
    assert_eq!(last.message, "Failed at deploy stage: simulated failure");
    assert!(!execution.logs.iter().any(|entry| entry.stage == "complete"));
    assert!(execution.logs.iter().all(|entry| entry.step.is_none()));
}

#[tokio::test]
async fn test_explicit_success_result_ignores_failure_stage() {
    let manager = ExecutionManager::with_default_engines(&fast_config()).await;
    let options = ExecutionOptions {
        result: Some(ExecutionStatus::Success),
        failure_stage: Some("build".to_string()),
        ..ExecutionOptions::default()
    };
    let id = manager
        .create_execution("project-1", MOCK_PLATFORM, "manual", options)
        .await
        .unwrap();
    manager.start_execution(&id).await.unwrap();

    let execution = wait_for_terminal(&manager, &id).await;
    assert_eq!(execution.status, ExecutionStatus::Success);
}

#[tokio::test]
async fn test_status_never_moves_backwards() {
    let manager = ExecutionManager::with_default_engines(&fast_config()).await;
    let id = manager
        .create_execution("project-1", MOCK_PLATFORM, "manual", workflow_options())
        .await
        .unwrap();

    let rank = |status: ExecutionStatus| match status {
        ExecutionStatus::Pending => 0,
        ExecutionStatus::Running => 1,
        _ => 2,
    };

    let mut observed = vec![manager.get_execution(&id).await.unwrap().status];
    manager.start_execution(&id).await.unwrap();
    loop {
        let status = manager.get_execution(&id).await.unwrap().status;
        observed.push(status);
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(observed[0], ExecutionStatus::Pending);
    assert!(observed.windows(2).all(|pair| rank(pair[0]) <= rank(pair[1])));
    let terminal = observed.last().copied().unwrap();
    assert!(observed
        .iter()
        .filter(|status| status.is_terminal())
        .all(|status| *status == terminal));
}
