//! Error handling module for resticctl
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Every failure that crosses a module boundary is one of these variants so the
//! caller can tell a broken configuration apart from a failed engine run.

use thiserror::Error;

/// Main error type for resticctl
#[derive(Error, Debug)]
pub enum ResticCtlError {
    /// IO errors (config file, pipes, process spawning)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file errors (location, permissions)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration document is malformed or inconsistent
    #[error("Validation error: {0}")]
    Validation(String),

    /// A repository name was requested that is not configured
    #[error("Repository {0} is not a configured repository")]
    UnknownRepository(String),

    /// A backup name was requested that is not configured
    #[error("Backup {0} is not a configured backup")]
    UnknownBackup(String),

    /// The engine could not be started or exited unsuccessfully
    #[error("Engine error: {0}")]
    Engine(String),

    /// Engine output could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// A user hook could not be rendered or launched
    #[error("Hook error: {0}")]
    Hook(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation pipeline was driven out of order
    #[error("Stage error: {0}")]
    Stage(#[from] crate::stage::StageTransitionError),
}

/// Result type alias for resticctl operations
pub type Result<T> = std::result::Result<T, ResticCtlError>;

impl ResticCtlError {
    /// Create a configuration file error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an engine error
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a hook error
    pub fn hook(msg: impl Into<String>) -> Self {
        Self::Hook(msg.into())
    }

    /// Returns true for errors raised while resolving the configuration
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true for unknown backup/repository names
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::UnknownBackup(_) | Self::UnknownRepository(_))
    }
}
