//! Error types for configuration loading.

use thiserror::Error;

/// Errors raised while loading or validating a [`LabConfig`](crate::LabConfig).
///
/// These are the only fatal conditions in the workspace besides missing
/// executables: they surface before any corpus work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A value parsed but is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Convenience alias for results with [`ConfigError`].
pub type Result<T> = std::result::Result<T, ConfigError>;
