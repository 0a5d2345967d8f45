//! Error types for the work-pulling engine.
//!
//! Only construction misuse, runtime/channel problems and configuration issues
//! surface here. Failures of individual work items never become a
//! `DispatchError`; they are folded into the failure tally of the run.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
    #[error("Dispatcher terminated: {0}")]
    DispatcherTerminated(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DispatchError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        DispatchError::InvalidArgument(message.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, DispatchError::InvalidArgument(_))
    }
}

impl From<config::ConfigError> for DispatchError {
    fn from(error: config::ConfigError) -> Self {
        DispatchError::Configuration(error.to_string())
    }
}

impl From<tokio::task::JoinError> for DispatchError {
    fn from(error: tokio::task::JoinError) -> Self {
        if error.is_panic() {
            DispatchError::DispatcherTerminated(format!("coordinator task panicked: {error}"))
        } else {
            DispatchError::DispatcherTerminated(format!("coordinator task cancelled: {error}"))
        }
    }
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
