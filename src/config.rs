//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

/// Maximum stored length of a task result, in characters.
pub const DEFAULT_MAX_RESULT_CHARS: usize = 4000;

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Node id used when a caller does not supply one.
    pub node_id: String,
    /// Results longer than this are truncated before storage.
    pub max_result_chars: usize,
    /// Length of `result_summary` in task listings.
    pub summary_chars: usize,
    /// Maximum number of simultaneously running tasks (0 = unlimited).
    pub max_running_tasks: usize,
    /// Capacity of the task event broadcast channel.
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            node_id: "main".to_string(),
            max_result_chars: DEFAULT_MAX_RESULT_CHARS,
            summary_chars: 200,
            max_running_tasks: 0,
            event_capacity: 256,
        }
    }
}

impl RegistryConfig {
    /// Load from `AGENT_TASKS_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            node_id: lookup("AGENT_TASKS_NODE_ID")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.node_id),
            max_result_chars: parse_or(
                &lookup,
                "AGENT_TASKS_MAX_RESULT_CHARS",
                defaults.max_result_chars,
            )?,
            summary_chars: parse_or(&lookup, "AGENT_TASKS_SUMMARY_CHARS", defaults.summary_chars)?,
            max_running_tasks: parse_or(
                &lookup,
                "AGENT_TASKS_MAX_RUNNING",
                defaults.max_running_tasks,
            )?,
            event_capacity: parse_or(
                &lookup,
                "AGENT_TASKS_EVENT_CAPACITY",
                defaults.event_capacity,
            )?,
        };

        if config.max_result_chars == 0 {
            return Err(ConfigError::InvalidValue {
                key: "AGENT_TASKS_MAX_RESULT_CHARS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if config.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "AGENT_TASKS_EVENT_CAPACITY".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(config)
    }
}

/// Host process configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the task API.
    pub port: u16,
    /// Directory for rolling log files. Logs go to stderr when unset.
    pub log_dir: Option<PathBuf>,
    /// Working directory for the built-in shell agent.
    pub shell_workdir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            log_dir: None,
            shell_workdir: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            port: parse_or(&lookup, "AGENT_TASKS_PORT", Self::default().port)?,
            log_dir: lookup("AGENT_TASKS_LOG_DIR").map(PathBuf::from),
            shell_workdir: lookup("AGENT_TASKS_SHELL_WORKDIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
        None => Ok(default),
    }
}
