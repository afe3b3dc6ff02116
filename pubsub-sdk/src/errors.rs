//! Unified error types for the `pubsub` crate.
//!
//! Every failed execution surfaces exactly one [`Error`], in one of four kinds:
//! - [`Error::Validation`]: client-side, pre-flight; no network I/O happened.
//! - [`Error::Transport`]: network failure, timeout or cancellation.
//! - [`Error::ResponseParsing`]: the body could not be decoded; the raw body is kept.
//! - [`Error::ApiStatus`]: a well-formed body reporting a service-level failure.
//!
//! Messages are deterministic and start with `pubsub/<kind>: pubsub/<operation>:` so
//! integrators can match on them across releases.

use thiserror::Error;

use crate::context::CancelReason;
use crate::endpoint::OperationType;

// --- Build-Time Error ---

/// Errors that can occur while building a [`crate::PubSubClient`].
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to build the HTTP client (reqwest configuration).
    #[error("Failed to build the HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    /// The configuration is unusable (e.g. no user id).
    #[error("Invalid client configuration: {0}")]
    Config(String),
}

// --- Validation ---

/// The first violated precondition of a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Name of the offending field or key (e.g. `subscribe_key`, `channel`).
    pub field: &'static str,
    /// Human-readable message (e.g. `Missing Subscribe Key`).
    pub message: String,
}

impl ValidationError {
    /// Create a validation error for `field`.
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    /// `Missing <label>` for a required value that was empty or absent.
    pub fn missing(field: &'static str, label: &str) -> Self {
        Self::new(field, format!("Missing {label}"))
    }
}

// --- Transport ---

/// Network-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request or connect timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// The caller's context was cancelled or hit its deadline. The in-flight exchange was dropped.
    #[error("request cancelled: {0}")]
    Cancelled(CancelReason),

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Any other reqwest failure (TLS, I/O, redirect, body read).
    #[error("HTTP transport error: {0}")]
    Http(#[source] reqwest::Error),
}

impl TransportError {
    /// True for [`TransportError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }

    /// True for [`TransportError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(Box::new(err))
        } else {
            TransportError::Http(err)
        }
    }
}

// --- The Main Operational Error Enum ---

/// The crate's top-level error type. Exactly one kind is populated per failure.
#[derive(Debug, Error)]
pub enum Error {
    /// Client-side precondition failed; nothing was sent.
    #[error("pubsub/validation: pubsub/{operation}: {source}")]
    Validation {
        /// Operation that was being executed.
        operation: OperationType,
        /// The first violated precondition.
        source: ValidationError,
    },

    /// The HTTP exchange failed or was cancelled.
    #[error("pubsub/transport: pubsub/{operation}: {source}")]
    Transport {
        /// Operation that was being executed.
        operation: OperationType,
        /// Underlying transport failure.
        source: TransportError,
    },

    /// The response body could not be decoded.
    #[error("pubsub/parsing: pubsub/{operation}: Error unmarshalling response: {cause}")]
    ResponseParsing {
        /// Operation that was being executed.
        operation: OperationType,
        /// The body exactly as received.
        raw_body: Vec<u8>,
        /// Decoder message.
        cause: String,
    },

    /// The service answered with a failure. `message` is the service's own text, unmodified.
    #[error("pubsub/api: pubsub/{operation}: {message}")]
    ApiStatus {
        /// Operation that was being executed.
        operation: OperationType,
        /// HTTP status code of the response.
        status: u16,
        /// Service message, verbatim.
        message: String,
    },
}

impl Error {
    /// Operation this error belongs to.
    pub fn operation(&self) -> OperationType {
        match self {
            Error::Validation { operation, .. }
            | Error::Transport { operation, .. }
            | Error::ResponseParsing { operation, .. }
            | Error::ApiStatus { operation, .. } => *operation,
        }
    }

    /// The raw body of a [`Error::ResponseParsing`] failure.
    pub fn raw_body(&self) -> Option<&[u8]> {
        match self {
            Error::ResponseParsing { raw_body, .. } => Some(raw_body),
            _ => None,
        }
    }

    /// The service message of an [`Error::ApiStatus`] failure.
    pub fn service_message(&self) -> Option<&str> {
        match self {
            Error::ApiStatus { message, .. } => Some(message),
            _ => None,
        }
    }

    /// True if this is a transport error caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Transport { source, .. } if source.is_cancelled())
    }

    pub(crate) fn parsing(
        operation: OperationType,
        raw_body: &[u8],
        cause: impl std::fmt::Display,
    ) -> Self {
        Error::ResponseParsing {
            operation,
            raw_body: raw_body.to_vec(),
            cause: cause.to_string(),
        }
    }
}

/// A specialized `Result` type for `pubsub` operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use pubsub_common::constants::ERROR_NAMESPACE;

    use super::*;

    #[test]
    fn messages_are_namespaced() {
        let err = Error::Validation {
            operation: OperationType::Publish,
            source: ValidationError::missing("subscribe_key", "Subscribe Key"),
        };
        assert_eq!(
            err.to_string(),
            "pubsub/validation: pubsub/publish: Missing Subscribe Key"
        );
        assert!(err.to_string().starts_with(&format!("{ERROR_NAMESPACE}/")));

        let err = Error::parsing(OperationType::Time, b"<html>", "expected value at line 1");
        assert_eq!(
            err.to_string(),
            "pubsub/parsing: pubsub/time: Error unmarshalling response: expected value at line 1"
        );
        assert_eq!(err.raw_body(), Some(&b"<html>"[..]));

        let err = Error::ApiStatus {
            operation: OperationType::GrantToken,
            status: 403,
            message: "Forbidden".into(),
        };
        assert_eq!(err.to_string(), "pubsub/api: pubsub/grant-token: Forbidden");
        assert_eq!(err.service_message(), Some("Forbidden"));
    }

    #[test]
    fn connect_failures_keep_their_source() {
        use std::error::Error as _;

        let err = TransportError::Connect("connection refused".into());
        assert_eq!(err.to_string(), "connection failed: connection refused");
        assert_eq!(
            err.source().map(|source| source.to_string()).as_deref(),
            Some("connection refused")
        );
    }

    #[test]
    fn cancellation_is_detectable() {
        let err = Error::Transport {
            operation: OperationType::Signal,
            source: TransportError::Cancelled(CancelReason::Cancelled),
        };
        assert!(err.is_cancelled());
        assert_eq!(err.operation(), OperationType::Signal);
    }
}
