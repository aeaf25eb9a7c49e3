#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("Execution not found: {0}")]
    NotFound(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Engine not found for platform: {0}")]
    EngineNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("CI descriptor parse failure: {0}")]
    ParseFailure(String),

    #[error("Not implemented: {0}")]
    Unimplemented(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::ParseFailure(format!("YAML error: {}", err))
    }
}

impl AppError {
    /// Stable machine-readable kind, emitted as the `error_kind` log field.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::UnsupportedPlatform(_) => "unsupported_platform",
            AppError::EngineNotFound(_) => "engine_not_found",
            AppError::InvalidState(_) => "invalid_state",
            AppError::ParseFailure(_) => "parse_failure",
            AppError::Unimplemented(_) => "unimplemented",
            AppError::ConfigError(_) => "config_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
