use async_trait::async_trait;
use tracing::warn;

use super::ExecutionEngine;
use crate::ci::execution::{Execution, ExecutionOptions};
use crate::error::{AppError, Result};

/// Placeholder for a hosted CI provider. Every operation fails until the
/// provider API integration exists.
#[derive(Debug, Clone)]
pub struct ProviderEngine {
    provider: String,
}

impl ProviderEngine {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }

    pub fn github_actions() -> Self {
        Self::new("GitHub Actions")
    }

    fn unimplemented(&self, execution_id: &str) -> AppError {
        warn!(execution_id = %execution_id, provider = %self.provider, "Provider engine invoked");
        AppError::Unimplemented(format!("{} engine not implemented yet", self.provider))
    }
}

#[async_trait]
impl ExecutionEngine for ProviderEngine {
    async fn execute(&self, execution_id: &str, _options: ExecutionOptions) -> Result<()> {
        Err(self.unimplemented(execution_id))
    }

    async fn stop(&self, execution_id: &str) -> Result<()> {
        Err(self.unimplemented(execution_id))
    }

    async fn get_status(&self, execution_id: &str) -> Result<Execution> {
        Err(self.unimplemented(execution_id))
    }
}
