//! Error types for livecfg.

use std::fmt;

/// Result type alias for livecfg operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while registering or reloading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A watcher is already registered under this name.
    #[error("Configuration `{0}` already exists")]
    DuplicateName(String),

    /// No watcher is registered under this name.
    #[error("Configuration `{0}` is not registered")]
    NotRegistered(String),

    /// The configuration file could not be read.
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    /// The configuration file or overlay could not be decoded.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// One or more validators rejected the candidate.
    #[error("New configuration not applied because {} error(s) have been found: {}", .0.len(), join(.0))]
    Validation(Vec<ValidationError>),

    /// An applier failed; the remaining appliers did not run.
    #[error("Failed to apply configuration: {0}")]
    ApplyError(#[from] ApplyError),

    /// The file watch could not be set up.
    #[error("File watching error: {0}")]
    WatchSetup(String),
}

impl ConfigError {
    /// The validation errors carried by this error, if any.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validation error for configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// A field changed although it may only be set by the first load.
    Immutable {
        /// The field name/path
        field: String,
    },
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an immutable field error.
    pub fn immutable(field: impl Into<String>) -> Self {
        Self::Immutable {
            field: field.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Immutable { field } => write!(f, "Field '{}' is immutable", field),
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::Validation(vec![err])
    }
}

/// Error returned by an applier that could not make a configuration take effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ApplyError {
    message: String,
}

impl ApplyError {
    /// Create an apply error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}
