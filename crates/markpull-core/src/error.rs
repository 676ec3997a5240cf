//! Errors raised by the foundation crate.
//!
//! Remote and engine failures have their own types in the registry and
//! acquisition crates; this module only covers what core itself can reject.

use thiserror::Error;

/// Failure building one of the shared core values.
#[derive(Error, Debug)]
pub enum MarkpullError {
    /// Configuration could not be loaded or is out of range
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A value failed its format check
    #[error("validation error: {0}")]
    Validation(String),
}

/// Errors loading, saving or checking the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No platform config directory could be resolved
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// The file is not valid TOML for [`crate::AppConfig`]
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// The configuration could not be rendered as TOML
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Reading or writing the file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A setting is outside its allowed range
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Dotted setting name, e.g. `registry.page_size`
        field: String,
        /// What the value must satisfy
        reason: String,
    },
}

/// Result type alias using `MarkpullError`.
pub type Result<T> = std::result::Result<T, MarkpullError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
