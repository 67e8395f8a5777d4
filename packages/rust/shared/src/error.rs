//! Error types for LinkScout.
//!
//! Library crates use [`LinkScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all LinkScout operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A required pipeline state key is absent.
    #[error("missing input: state has no `{key}` key")]
    MissingInput { key: String },

    /// Data validation error (a state key holds the wrong shape, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Text-generation backend error (bridge, provider, transport).
    #[error("backend error: {0}")]
    Backend(String),

    /// Backend response could not be parsed into a link mapping.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LinkScoutError>;

impl LinkScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a missing-input error for a state key.
    pub fn missing_input(key: impl Into<String>) -> Self {
        Self::MissingInput { key: key.into() }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
