//! Error Types
//!
//! A single error enum covers every failure the orchestrator can report.
//! Configuration and precondition problems are detected before the run
//! directory is touched; execution errors happen after mutation began and
//! only ever concern the failing step.

use thiserror::Error;

/// Errors raised while preparing, executing, restarting or copying a run.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Malformed or incomplete workflow configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// One or more modules failed their installation check.
    #[error("Module error: {}", .0.join("; "))]
    Module(Vec<String>),

    /// A step failed while running.
    #[error("Execution error in step '{step}': {message}")]
    Execution { step: String, message: String },

    /// Filesystem state does not allow the operation (destination exists,
    /// source missing, ...).
    #[error("{0}")]
    Precondition(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl RunnerError {
    /// Shorthand for building a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for building a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RunnerError>;
