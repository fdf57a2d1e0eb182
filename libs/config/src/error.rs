//! Configuration errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Sources could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config_crate::ConfigError),

    /// A value is outside its allowed range
    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    /// A path setting referenced an undefined environment variable
    #[error("Failed to expand {field}: {reason}")]
    Expand { field: String, reason: String },

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
