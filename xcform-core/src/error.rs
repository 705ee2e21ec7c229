//! Error taxonomy for lifecycle operations

use std::time::Duration;

use thiserror::Error;

use crate::identity::MalformedIdentifier;
use crate::timeouts::Operation;
use crate::transport::TransportError;

/// Why an operation stopped before the remote call completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelCause {
    /// The resolved timeout elapsed
    DeadlineExceeded(Duration),
    /// The caller cancelled the operation
    Requested,
}

impl std::fmt::Display for CancelCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelCause::DeadlineExceeded(d) => write!(f, "timed out after {:?}", d),
            CancelCause::Requested => write!(f, "cancelled"),
        }
    }
}

/// Errors surfaced by the lifecycle controller
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Configuration is invalid; caught before any remote call
    #[error("Validation failed for {resource_type}: {message}")]
    Validation {
        resource_type: String,
        message: String,
    },

    /// The remote object does not exist
    #[error("{resource_type} {namespace}/{name} not found")]
    NotFound {
        resource_type: String,
        namespace: String,
        name: String,
    },

    /// Any other transport or API failure
    #[error("Failed to {operation} {resource_type}: {source}")]
    Remote {
        operation: Operation,
        resource_type: String,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    MalformedIdentifier(#[from] MalformedIdentifier),

    /// Deadline or caller cancellation, distinct from a rejection
    #[error("{operation} of {resource_type} {cause}")]
    Cancelled {
        operation: Operation,
        resource_type: String,
        cause: CancelCause,
    },

    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),
}

impl ResourceError {
    pub fn validation(resource_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            resource_type: resource_type.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

pub type ResourceResult<T> = Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportErrorKind;

    #[test]
    fn remote_error_carries_operation_and_kind() {
        let err = ResourceError::Remote {
            operation: Operation::Create,
            resource_type: "healthcheck".to_string(),
            source: TransportError::new(TransportErrorKind::Unauthorized, "bad token"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to create healthcheck: UNAUTHORIZED: bad token"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn cancelled_is_distinct_from_remote() {
        let err = ResourceError::Cancelled {
            operation: Operation::Read,
            resource_type: "origin_pool".to_string(),
            cause: CancelCause::DeadlineExceeded(Duration::from_secs(300)),
        };
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "read of origin_pool timed out after 300s");
    }

    #[test]
    fn malformed_identifier_converts() {
        let err: ResourceError = crate::identity::decode("badformat").unwrap_err().into();
        assert!(matches!(err, ResourceError::MalformedIdentifier(_)));
    }
}
