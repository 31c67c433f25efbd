//! Configuration error types

use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Failed to load configuration from {source_name}: {message}")]
    LoadFailed {
        source_name: String,
        message: String,
    },

    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration directory not found: {0}")]
    DirectoryNotFound(String),
}

impl ConfigurationError {
    pub fn load_failed(source_name: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::LoadFailed {
            source_name: source_name.into(),
            message: err.to_string(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;
