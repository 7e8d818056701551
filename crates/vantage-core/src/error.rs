use std::io;
use thiserror::Error;

use crate::types::EventKey;

#[derive(Error, Debug)]
pub enum VantageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage busy: {0}")]
    Busy(String),

    #[error("Repository error: {message}")]
    Repository { message: String, retryable: bool },

    #[error("Malformed event {key}: {reason}")]
    MalformedEvent { key: EventKey, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl VantageError {
    /// A repository failure the caller may retry (timeouts, connection resets).
    pub fn transient(message: impl Into<String>) -> Self {
        VantageError::Repository {
            message: message.into(),
            retryable: true,
        }
    }

    /// A repository failure that will not go away by retrying.
    pub fn permanent(message: impl Into<String>) -> Self {
        VantageError::Repository {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn malformed(key: EventKey, reason: impl Into<String>) -> Self {
        VantageError::MalformedEvent {
            key,
            reason: reason.into(),
        }
    }

    /// Whether the failed operation can be attempted again unchanged.
    ///
    /// Lock contention, IO hiccups and transient repository failures are
    /// retryable; everything else needs a code or data fix first.
    pub fn is_retryable(&self) -> bool {
        match self {
            VantageError::Busy(_) | VantageError::Io(_) => true,
            VantageError::Repository { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, VantageError::MalformedEvent { .. })
    }
}

impl From<serde_json::Error> for VantageError {
    fn from(e: serde_json::Error) -> Self {
        VantageError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VantageError>;
