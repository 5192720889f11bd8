use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ConfigError;

const DEFAULT_HTTP_BIND: &str = "0.0.0.0:8085";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_EVAL_TIMEOUT_MS: u64 = 2_000;

/// Runtime environment used by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

/// Process configuration shared by the service and the CLI.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub environment: Environment,
    /// Policy file or directory. `None` selects the built-in ride-share table.
    pub policy_path: Option<PathBuf>,
    pub http_bind: String,
    pub log_level: String,
    /// Deadline the caller places around a single evaluation.
    pub eval_timeout: Duration,
    /// Whether internal deny reasons are returned by the dry-run API.
    pub expose_reasons: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            policy_path: None,
            http_bind: DEFAULT_HTTP_BIND.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            eval_timeout: Duration::from_millis(DEFAULT_EVAL_TIMEOUT_MS),
            expose_reasons: true,
        }
    }
}

impl CoreConfig {
    /// Loads configuration from `RIDESHEAR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_with_prefix("RIDESHEAR_")
    }

    /// Loads configuration from env vars prefixed with the provided value (e.g. `RIDESHEAR_`).
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{}{}", prefix, suffix);

        let environment = env::var(key("ENV"))
            .map(|raw| Environment::from_str(&raw))
            .unwrap_or_default();

        let policy_path = env::var(key("POLICY_PATH"))
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from);

        let http_bind = env::var(key("HTTP_BIND")).unwrap_or_else(|_| DEFAULT_HTTP_BIND.into());
        let log_level = env::var(key("LOG_LEVEL")).unwrap_or_else(|_| DEFAULT_LOG_LEVEL.into());

        let timeout_key = key("EVAL_TIMEOUT_MS");
        let eval_timeout = match env::var(&timeout_key) {
            Ok(raw) => {
                let millis = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvVar {
                    key: timeout_key.clone(),
                    value: raw.clone(),
                })?;
                Duration::from_millis(millis)
            }
            Err(_) => Duration::from_millis(DEFAULT_EVAL_TIMEOUT_MS),
        };

        let reasons_key = key("EXPOSE_REASONS");
        let expose_reasons = match env::var(&reasons_key) {
            Ok(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidEnvVar {
                key: reasons_key.clone(),
                value: raw.clone(),
            })?,
            Err(_) => environment != Environment::Production,
        };

        Ok(Self {
            environment,
            policy_path,
            http_bind,
            log_level,
            eval_timeout,
            expose_reasons,
        })
    }

    /// Whether the service is running in production.
    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
