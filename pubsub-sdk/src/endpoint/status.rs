//! Status metadata attached to every execution outcome.

use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;

use crate::endpoint::OperationType;
use crate::errors::{Error, TransportError};

/// Coarse classification of an execution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCategory {
    /// 2xx and a decodable body.
    Acknowledgment,
    /// Client-side validation failed, or the service answered 400.
    BadRequest,
    /// The service answered 403.
    AccessDenied,
    /// The request or connect timeout elapsed.
    Timeout,
    /// The caller's context was cancelled or hit its deadline.
    Cancelled,
    /// The connection could not be established or broke mid-exchange.
    NetworkIssues,
    /// The body could not be decoded.
    MalformedResponse,
    /// Any other service-side failure.
    ServiceError,
}

impl StatusCategory {
    /// Category of a failed execution.
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Validation { .. } => StatusCategory::BadRequest,
            Error::Transport { source, .. } => match source {
                TransportError::Timeout => StatusCategory::Timeout,
                TransportError::Cancelled(_) => StatusCategory::Cancelled,
                TransportError::Connect(_) | TransportError::Http(_) => {
                    StatusCategory::NetworkIssues
                }
            },
            Error::ResponseParsing { .. } => StatusCategory::MalformedResponse,
            // A 2xx body that reports an error is still a failure.
            Error::ApiStatus {
                status: 200..=299, ..
            } => StatusCategory::ServiceError,
            Error::ApiStatus { status, .. } => Self::from_status_code(*status),
        }
    }

    /// Category implied by an HTTP status code alone.
    pub fn from_status_code(code: u16) -> Self {
        match code {
            200..=299 => StatusCategory::Acknowledgment,
            400 => StatusCategory::BadRequest,
            403 => StatusCategory::AccessDenied,
            _ => StatusCategory::ServiceError,
        }
    }

    /// True for [`StatusCategory::Acknowledgment`].
    pub fn is_success(self) -> bool {
        self == StatusCategory::Acknowledgment
    }
}

impl Display for StatusCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StatusCategory::Acknowledgment => "acknowledgment",
            StatusCategory::BadRequest => "bad-request",
            StatusCategory::AccessDenied => "access-denied",
            StatusCategory::Timeout => "timeout",
            StatusCategory::Cancelled => "cancelled",
            StatusCategory::NetworkIssues => "network-issues",
            StatusCategory::MalformedResponse => "malformed-response",
            StatusCategory::ServiceError => "service-error",
        };
        f.write_str(name)
    }
}

/// What happened during one execution. Populated for successes and failures alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMetadata {
    /// Operation executed.
    pub operation: OperationType,
    /// Outcome classification.
    pub category: StatusCategory,
    /// HTTP status code, when a response was received.
    pub status_code: Option<u16>,
    /// Wall time from the start of the execution to its outcome.
    pub latency: Duration,
}

impl StatusMetadata {
    /// True when the execution succeeded.
    pub fn is_success(&self) -> bool {
        self.category.is_success()
    }
}

/// A successful execution: the typed response and its status.
#[derive(Debug, Clone)]
pub struct Executed<T> {
    /// Decoded response.
    pub response: T,
    /// Status metadata.
    pub status: StatusMetadata,
}

/// A failed execution: the error and its status.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ExecutionError {
    /// The single error kind describing the failure.
    #[source]
    pub error: Error,
    /// Status metadata.
    pub status: StatusMetadata,
}

impl From<ExecutionError> for Error {
    fn from(value: ExecutionError) -> Self {
        value.error
    }
}

/// Result of [`crate::execute`].
pub type ExecutionResult<T> = std::result::Result<Executed<T>, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelReason;
    use crate::errors::ValidationError;

    #[test]
    fn errors_map_to_categories() {
        let validation = Error::Validation {
            operation: OperationType::Publish,
            source: ValidationError::missing("channel", "Channel"),
        };
        assert_eq!(
            StatusCategory::from_error(&validation),
            StatusCategory::BadRequest
        );

        let cancelled = Error::Transport {
            operation: OperationType::Publish,
            source: TransportError::Cancelled(CancelReason::DeadlineExceeded),
        };
        assert_eq!(
            StatusCategory::from_error(&cancelled),
            StatusCategory::Cancelled
        );

        let denied = Error::ApiStatus {
            operation: OperationType::GrantToken,
            status: 403,
            message: "Forbidden".into(),
        };
        assert_eq!(
            StatusCategory::from_error(&denied),
            StatusCategory::AccessDenied
        );

        let flagged = Error::ApiStatus {
            operation: OperationType::Time,
            status: 200,
            message: "Quota exceeded".into(),
        };
        assert_eq!(
            StatusCategory::from_error(&flagged),
            StatusCategory::ServiceError
        );
        assert!(!StatusCategory::from_error(&flagged).is_success());

        let parsing = Error::parsing(OperationType::Time, b"x", "nope");
        assert_eq!(
            StatusCategory::from_error(&parsing),
            StatusCategory::MalformedResponse
        );
    }

    #[test]
    fn status_codes_map_to_categories() {
        assert!(StatusCategory::from_status_code(204).is_success());
        assert_eq!(
            StatusCategory::from_status_code(500),
            StatusCategory::ServiceError
        );
        assert_eq!(StatusCategory::from_status_code(400).to_string(), "bad-request");
    }

    #[test]
    fn execution_error_displays_inner_error() {
        let err = ExecutionError {
            error: Error::ApiStatus {
                operation: OperationType::Signal,
                status: 413,
                message: "Signal size too large".into(),
            },
            status: StatusMetadata {
                operation: OperationType::Signal,
                category: StatusCategory::ServiceError,
                status_code: Some(413),
                latency: Duration::from_millis(3),
            },
        };
        assert_eq!(
            err.to_string(),
            "pubsub/api: pubsub/signal: Signal size too large"
        );
        let inner: Error = err.into();
        assert_eq!(inner.service_message(), Some("Signal size too large"));
    }
}
