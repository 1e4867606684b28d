//! Behavior configuration
//!
//! Field names mapped by the listeners, the slug suffix separator, an
//! optional probe bound for slug negotiation and the level used for
//! change-log lines. Values come from defaults, environment variables or a
//! YAML document.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::Level;

pub const ENV_SLUG_FIELD: &str = "ELIF_BEHAVIORS_SLUG_FIELD";
pub const ENV_DELETED_AT_FIELD: &str = "ELIF_BEHAVIORS_DELETED_AT_FIELD";
pub const ENV_SLUG_SEPARATOR: &str = "ELIF_BEHAVIORS_SLUG_SEPARATOR";
pub const ENV_MAX_SLUG_ATTEMPTS: &str = "ELIF_BEHAVIORS_MAX_SLUG_ATTEMPTS";
pub const ENV_LOG_LEVEL: &str = "ELIF_BEHAVIORS_LOG_LEVEL";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },
}

/// Settings shared by all behavior listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorsConfig {
    /// Field mapped on sluggable classes; its value comes from `Sluggable::slug`
    pub slug_field: String,
    /// Field mapped on soft-deletable classes; written from `SoftDeletable::deleted_at`
    pub deleted_at_field: String,
    /// Placed between a colliding slug and its numeric suffix
    pub slug_suffix_separator: String,
    /// `None` keeps probing until a free slug is found
    pub max_slug_attempts: Option<u32>,
    /// Level of the change-log lines (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for BehaviorsConfig {
    fn default() -> Self {
        Self {
            slug_field: "slug".to_string(),
            deleted_at_field: "deleted_at".to_string(),
            slug_suffix_separator: "-".to_string(),
            max_slug_attempts: None,
            log_level: "info".to_string(),
        }
    }
}

impl BehaviorsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Ok(field) = env::var(ENV_SLUG_FIELD) {
            config.slug_field = field;
        }

        if let Ok(field) = env::var(ENV_DELETED_AT_FIELD) {
            config.deleted_at_field = field;
        }

        if let Ok(separator) = env::var(ENV_SLUG_SEPARATOR) {
            config.slug_suffix_separator = separator;
        }

        if let Ok(attempts) = env::var(ENV_MAX_SLUG_ATTEMPTS) {
            let parsed = attempts.parse::<u32>().map_err(|_| ConfigError::InvalidValue {
                field: "max_slug_attempts".to_string(),
                value: attempts.clone(),
                expected: "positive integer".to_string(),
            })?;
            config.max_slug_attempts = Some(parsed);
        }

        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(source).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slug_field.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "slug_field".to_string(),
                value: self.slug_field.clone(),
                expected: "non-empty field name".to_string(),
            });
        }

        if self.deleted_at_field.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "deleted_at_field".to_string(),
                value: self.deleted_at_field.clone(),
                expected: "non-empty field name".to_string(),
            });
        }

        if self.max_slug_attempts == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_slug_attempts".to_string(),
                value: "0".to_string(),
                expected: "positive integer".to_string(),
            });
        }

        self.level()?;
        Ok(())
    }

    /// Change-log level as a tracing level
    pub fn level(&self) -> Result<Level, ConfigError> {
        match self.log_level.trim().to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" | "warning" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => Err(ConfigError::InvalidValue {
                field: "log_level".to_string(),
                value: self.log_level.clone(),
                expected: "trace, debug, info, warn, or error".to_string(),
            }),
        }
    }
}
