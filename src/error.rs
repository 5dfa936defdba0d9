//! Error types for lazyjack

use thiserror::Error;

/// Main error type for lazyjack operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Netlink error: {0}")]
    Netlink(#[from] rtnetlink::Error),

    #[error("Command execution failed: {0}")]
    Command(String),

    #[error("Unexpected collaborator output: {0}")]
    Translation(String),

    #[error("{first}; additionally {second}")]
    Composite { first: String, second: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a composite error from two underlying failures
    pub fn composite(first: impl std::fmt::Display, second: impl std::fmt::Display) -> Self {
        Self::Composite {
            first: first.to_string(),
            second: second.to_string(),
        }
    }

    /// True for the kernel idempotence signals that callers demote to "skipping"
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::AlreadyExists(_))
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
