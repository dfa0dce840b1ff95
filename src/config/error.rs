//! Configuration Error Types
//!
//! Errors raised while loading core settings or parsing a job document. They are
//! converted into [`crate::error::SyncError::Configuration`] at the engine
//! boundary, so a bad configuration always fails before any task starts.

use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// File I/O errors during configuration loading
    #[error("Failed to read configuration file '{file_path}': {error}")]
    FileReadError { file_path: String, error: String },

    /// Syntax or shape errors in a configuration source
    #[error("Parse error for {source_name}: {reason}")]
    ParseError { source_name: String, reason: String },

    /// Missing required configuration field
    #[error("Missing required configuration field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Path expression that cannot address a configuration node
    #[error("Invalid configuration path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Placeholder in the job document with no supplied value
    #[error("Unresolved placeholder '${{{name}}}' in job document")]
    UnresolvedPlaceholder { name: String },

    /// Configuration validation errors
    #[error("Configuration validation failed: {error}")]
    ValidationError { error: String },
}

impl ConfigurationError {
    pub fn file_read_error(file_path: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::FileReadError {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }

    pub fn parse_error(source_name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ParseError {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn missing_required_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn validation_error(error: impl Into<String>) -> Self {
        Self::ValidationError {
            error: error.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(error: config::ConfigError) -> Self {
        Self::parse_error("core settings", error)
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;
