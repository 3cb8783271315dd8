//! Error types for ane-rs.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ane-rs operations.
pub type Result<T> = std::result::Result<T, AneError>;

/// Errors that can occur while driving the Neural Engine library.
#[derive(Debug, Error)]
pub enum AneError {
    /// The native library could not be loaded.
    #[error("Library loading failed: {0}")]
    LibraryLoad(String),

    /// The native library does not export a required entry point.
    #[error("Missing symbol `{symbol}`: {reason}")]
    MissingSymbol {
        symbol: &'static str,
        reason: String,
    },

    /// The native constructor returned no context, or a context id is stale.
    #[error("Context creation failed: {0}")]
    ContextCreation(String),

    /// Caller-supplied buffers or arrays do not match the model.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The native library reported a failure.
    #[error("Native call failed: {0}")]
    Native(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl AneError {
    /// Create a library load error.
    pub fn library_load(msg: impl Into<String>) -> Self {
        Self::LibraryLoad(msg.into())
    }

    /// Create a context error.
    pub fn context(msg: impl Into<String>) -> Self {
        Self::ContextCreation(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a native call error.
    pub fn native(msg: impl Into<String>) -> Self {
        Self::Native(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
