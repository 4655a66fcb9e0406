//! Error types for event construction, sending and delivery.
//!
//! Two families live here. [`Error`] covers everything a caller can be told
//! synchronously, before an event crosses into the worker pool. Anything
//! discovered after an event was accepted is classified as a
//! [`DeliveryError`] inside a worker and reported only through the response
//! queue, never returned to the caller.

use std::fmt;

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Synchronous errors surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An argument was rejected before anything was queued.
    #[error("invalid argument `{name}`: {message}")]
    InvalidArgument {
        /// Name of the offending argument
        name: &'static str,
        /// What was wrong with it
        message: String,
    },

    /// The client (and its transmission) has been closed.
    #[error("tried to send on a closed client")]
    ClientClosed,

    /// The event carries no fields.
    #[error("no fields added to event; will not send an empty event")]
    EmptyEvent,

    /// The event has no API host to send to.
    #[error("no api host for event; will not send")]
    MissingApiHost,

    /// The event has no write key.
    #[error("no write key for event; will not send")]
    MissingWriteKey,

    /// The event has no dataset.
    #[error("no dataset for event; will not send")]
    MissingDataset,

    /// Client or transport configuration is unusable.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },
}

impl Error {
    /// Creates an invalid argument error.
    pub fn invalid_argument(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument { name, message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}

/// Outcome classification for a failed delivery attempt inside a worker.
///
/// The first three variants are expected transport failures and become a
/// response carrying [`DeliveryError::response_message`]. [`DeliveryError::Fatal`]
/// ends the worker that hit it.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Connection could not be established or was refused.
    #[error("network connection failed: {message}")]
    Network {
        /// Underlying transport message
        message: String,
    },

    /// The request did not complete within the configured timeout.
    #[error("request timeout after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds
        timeout_ms: u64,
    },

    /// The response stream failed while being read.
    #[error("failed to read response stream: {message}")]
    Stream {
        /// Underlying stream message
        message: String,
    },

    /// Anything the worker cannot classify as a transport failure.
    #[error("{message}")]
    Fatal {
        /// Description of the unexpected failure
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Creates a stream read error.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream { message: message.into() }
    }

    /// Creates a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal { message: message.into() }
    }

    /// Whether this error must terminate the worker that observed it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// Human-readable message recorded on the response for this failure.
    pub fn response_message(&self) -> String {
        match self {
            Self::Network { .. } => format!("{SEND_ERROR_PREFIX}Network error"),
            Self::Timeout { .. } => format!("{SEND_ERROR_PREFIX}Operation timed out"),
            Self::Stream { .. } => format!("{SEND_ERROR_PREFIX}Failed to read the response data"),
            Self::Fatal { message } => format!("Fatal error: {message}"),
        }
    }
}

const SEND_ERROR_PREFIX: &str = "Error while sending the event: ";

/// Coarse category of a delivery failure, used as a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection level failures.
    Network,
    /// Timeouts.
    Timeout,
    /// Response stream failures.
    Stream,
    /// Unclassified failures.
    Fatal,
}

impl From<&DeliveryError> for ErrorCategory {
    fn from(error: &DeliveryError) -> Self {
        match error {
            DeliveryError::Network { .. } => Self::Network,
            DeliveryError::Timeout { .. } => Self::Timeout,
            DeliveryError::Stream { .. } => Self::Stream,
            DeliveryError::Fatal { .. } => Self::Fatal,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::Stream => write!(f, "stream"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}
