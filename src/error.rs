//! Error types for the navigation core

use thiserror::Error;

/// Navigation core error type
///
/// Timeouts are not errors: they surface as `NavigationOutcome::TimedOut`.
#[derive(Error, Debug)]
pub enum NavError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Goal unreachable: {0}")]
    Unreachable(String),

    #[error("Execution fault: {0}")]
    ExecutionFault(String),

    #[error("Sensor fault: {0}")]
    SensorFault(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Command channel closed")]
    ChannelClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for NavError {
    fn from(e: toml::de::Error) -> Self {
        NavError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NavError>;
