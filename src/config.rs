use crate::ci::engine::{DelayRange, SimulationConfig};
use crate::error::{AppError, Result};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(AppError::ConfigError(format!(
                "LOG_FORMAT must be compact, pretty or json, got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub logging: LoggingConfig,
    pub simulation: SimulationConfig,
    pub default_platform: String,
}

impl Config {
    pub fn init() -> Result<Config> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SimulationConfig::default();

        let level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_owned());
        let format = lookup("LOG_FORMAT")
            .map(|value| value.parse::<LogFormat>())
            .transpose()?
            .unwrap_or(LogFormat::Compact);

        let stage_delay = lookup("SIMULATION_STAGE_DELAY_MS")
            .map(|value| value.parse::<DelayRange>())
            .transpose()?
            .unwrap_or(defaults.stage_delay);
        let step_delay = lookup("SIMULATION_STEP_DELAY_MS")
            .map(|value| value.parse::<DelayRange>())
            .transpose()?
            .unwrap_or(defaults.step_delay);
        let seed = lookup("SIMULATION_SEED")
            .map(|value| {
                value.trim().parse::<u64>().map_err(|_| {
                    AppError::ConfigError("SIMULATION_SEED must be a number".to_string())
                })
            })
            .transpose()?;

        let default_platform = lookup("DEFAULT_PLATFORM").unwrap_or_else(|| "mock".to_owned());

        Ok(Config {
            logging: LoggingConfig { level, format },
            simulation: SimulationConfig {
                stage_delay,
                step_delay,
                seed,
            },
            default_platform,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.logging, LoggingConfig::default());
        assert_eq!(config.simulation, SimulationConfig::default());
        assert_eq!(config.default_platform, "mock");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("LOG_LEVEL", "debug"),
            ("LOG_FORMAT", "JSON"),
            ("SIMULATION_STAGE_DELAY_MS", "10-20"),
            ("SIMULATION_STEP_DELAY_MS", "5"),
            ("SIMULATION_SEED", "42"),
            ("DEFAULT_PLATFORM", "github_actions"),
        ]))
        .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.simulation.stage_delay, DelayRange::new(10, 20));
        assert_eq!(config.simulation.step_delay, DelayRange::new(5, 5));
        assert_eq!(config.simulation.seed, Some(42));
        assert_eq!(config.default_platform, "github_actions");
    }

    #[test]
    fn test_invalid_values() {
        for pairs in [
            [("LOG_FORMAT", "xml")],
            [("SIMULATION_STAGE_DELAY_MS", "slow")],
            [("SIMULATION_SEED", "-1")],
        ] {
            let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
            assert!(matches!(err, AppError::ConfigError(_)));
        }
    }
}
