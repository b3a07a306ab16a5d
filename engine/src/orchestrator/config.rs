//! Engine configuration
//!
//! Loaded from JSON (missing keys take defaults), optionally overridden from
//! the environment:
//!
//! | Variable                 | Field                    |
//! |--------------------------|--------------------------|
//! | `REBATE_MAX_CONCURRENCY` | `max_concurrent_members` |
//! | `REBATE_STRICT_LEVELS`   | `strict_levels`          |

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_MAX_CONCURRENCY: &str = "REBATE_MAX_CONCURRENCY";
pub const ENV_STRICT_LEVELS: &str = "REBATE_STRICT_LEVELS";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Config parse failed: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("max_concurrent_members must be at least 1")]
    ZeroConcurrency,
}

/// Tunables for a computation run
///
/// # Example
/// ```
/// use rebate_engine_core::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{ "max_concurrent_members": 2 }"#).unwrap();
/// assert_eq!(config.max_concurrent_members, 2);
/// assert!(!config.strict_levels);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Members whose backend queries may be in flight at once; keep this
    /// within what the backend's rate limit tolerates
    pub max_concurrent_members: usize,

    /// Abort the run with an invariant violation when a member sits deeper
    /// than the last rebate level, instead of recording a diagnostic
    pub strict_levels: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_members: 8,
            strict_levels: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_CONCURRENCY) {
            self.max_concurrent_members =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_MAX_CONCURRENCY,
                        value: value.clone(),
                    })?;
        }
        if let Some(value) = lookup(ENV_STRICT_LEVELS) {
            self.strict_levels = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_STRICT_LEVELS,
                        value,
                    })
                }
            };
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_members == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}
