//! Error types shared by every layer of the session engine

use crate::channel::ChannelError;
use crate::db::DbError;
use thiserror::Error;

/// Errors surfaced by the ledger, transport and attempt layers
#[derive(Debug, Error)]
pub enum LabError {
    // Protocol errors
    #[error("Unsupported host version: expected major {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
    #[error("Unsupported host version")]
    UnsupportedHostVersion,
    #[error("Unknown Command")]
    UnknownCommand(String),
    #[error("Unknown component type: {0}")]
    UnknownComponentType(String),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    // Precondition violations
    #[error("Connection has not been established")]
    NotConnected,
    #[error("connect has previously been called")]
    AlreadyConnected,
    #[error("Attempt has not yet been resumed")]
    NotResumed,
    #[error("Attempt already resumed")]
    AlreadyResumed,
    #[error("Lab has not been created")]
    NotCreated,
    #[error("Processor already running")]
    AlreadyStarted,
    #[error("Processor has not been started")]
    NotStarted,
    #[error("{0}")]
    SessionBusy(&'static str),
    #[error("Component {0} has been closed")]
    ComponentClosed(String),
    #[error("Component type {0} already has a constructor registered")]
    DuplicateComponentType(String),

    // Lookups against unknown identifiers
    #[error("Component not found: {0}")]
    ComponentNotFound(String),
    #[error("Value not found: {0}")]
    ValueNotFound(String),
    #[error("No configuration set")]
    NoConfiguration,

    // Delivery failures
    #[error("Delivery failed: {0}")]
    Delivery(#[from] ChannelError),
    #[error("Channel disconnected before a reply arrived")]
    Disconnected,

    /// Failure payload returned by the remote side
    #[error("Host error: {0}")]
    Host(String),
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type LabResult<T> = Result<T, LabError>;

/// Classification of [`LabError`] following the engine's error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Version mismatch, unknown command, malformed payload
    Protocol,
    /// Programmer error: called out of order
    Precondition,
    /// Unknown identifier, corrupted or mismatched ledger
    NotFound,
    /// The channel could not deliver a request
    Delivery,
    /// Failure reported by the host or its storage
    Host,
}

impl ErrorKind {
    /// Only delivery failures may succeed when reissued; the engine itself
    /// never retries, callers decide.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Delivery)
    }
}

impl LabError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::VersionMismatch { .. }
            | Self::UnsupportedHostVersion
            | Self::UnknownCommand(_)
            | Self::UnknownComponentType(_)
            | Self::InvalidPayload(_)
            | Self::Serialization(_) => ErrorKind::Protocol,
            Self::NotConnected
            | Self::AlreadyConnected
            | Self::NotResumed
            | Self::AlreadyResumed
            | Self::NotCreated
            | Self::AlreadyStarted
            | Self::NotStarted
            | Self::SessionBusy(_)
            | Self::ComponentClosed(_)
            | Self::DuplicateComponentType(_) => ErrorKind::Precondition,
            Self::ComponentNotFound(_) | Self::ValueNotFound(_) | Self::NoConfiguration => {
                ErrorKind::NotFound
            }
            Self::Delivery(_) | Self::Disconnected => ErrorKind::Delivery,
            Self::Host(_) | Self::Storage(_) => ErrorKind::Host,
        }
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }

    /// Rebuild an error from a failure payload received over the wire
    pub fn from_failure_payload(payload: &serde_json::Value) -> Self {
        let message = payload
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .or_else(|| payload.as_str().map(String::from))
            .unwrap_or_else(|| payload.to_string());
        Self::Host(message)
    }

    /// Failure payload sent back over the wire for this error
    pub fn to_failure_payload(&self) -> serde_json::Value {
        serde_json::json!({ "message": self.to_string() })
    }
}
