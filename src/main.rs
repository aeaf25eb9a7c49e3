use anyhow::Context;
use dotenv::dotenv;
use pipeline_orchestrator::{
    ci::{ExecutionManager, ExecutionOptions},
    config::Config,
    core::logging::init_structured_logging,
};
use std::time::Duration;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::init()?;
    init_structured_logging(&config.logging)?;

    let mut args = std::env::args().skip(1);
    let descriptor_path = args.next();
    let platform = args.next().unwrap_or_else(|| config.default_platform.clone());

    let ci_config_content = match &descriptor_path {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read CI descriptor {}", path))?,
        ),
        None => None,
    };

    let manager = ExecutionManager::with_default_engines(&config.simulation).await;
    info!(platforms = ?manager.platforms().await, "Execution engines ready");

    let options = ExecutionOptions {
        ci_config_content,
        ..ExecutionOptions::default_profile()
    };
    let execution_id = manager
        .create_execution("local", &platform, "manual", options)
        .await?;
    manager.start_execution(&execution_id).await?;

    let execution = loop {
        let execution = manager.get_execution(&execution_id).await?;
        if execution.status.is_terminal() {
            break execution;
        }
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = tokio::signal::ctrl_c() => {
                if let Err(e) = manager.stop_execution(&execution_id).await {
                    warn!(
                        execution_id = %execution_id,
                        error_kind = e.kind(),
                        "Stop request rejected: {}",
                        e
                    );
                }
            }
        }
    };

    info!(
        execution_id = %execution_id,
        status = %execution.status,
        duration = execution.duration,
        "Execution finished"
    );
    println!("{}", serde_json::to_string_pretty(&execution)?);

    Ok(())
}
