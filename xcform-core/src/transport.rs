//! Transport - The remote CRUD calls the controller consumes
//!
//! Implementations own connection pooling, authentication and retries. They
//! must be safe for concurrent use and hold no per-instance state.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::descriptor::ResourceDescriptor;
use crate::envelope::Envelope;

/// Classification of a failed remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    NotFound,
    Unauthorized,
    Forbidden,
    Conflict,
    RateLimited,
    BadRequest,
    /// The API does not support the operation for this kind (HTTP 501)
    NotImplemented,
    Server,
    Network,
    Timeout,
    /// Response body could not be decoded
    Decode,
    Other,
}

impl TransportErrorKind {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => TransportErrorKind::BadRequest,
            401 => TransportErrorKind::Unauthorized,
            403 => TransportErrorKind::Forbidden,
            404 => TransportErrorKind::NotFound,
            409 => TransportErrorKind::Conflict,
            429 => TransportErrorKind::RateLimited,
            501 => TransportErrorKind::NotImplemented,
            500..=599 => TransportErrorKind::Server,
            _ => TransportErrorKind::Other,
        }
    }

    /// Whether a retry might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportErrorKind::RateLimited
                | TransportErrorKind::Server
                | TransportErrorKind::Network
                | TransportErrorKind::Timeout
        )
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::NotFound => "NOT_FOUND",
            TransportErrorKind::Unauthorized => "UNAUTHORIZED",
            TransportErrorKind::Forbidden => "FORBIDDEN",
            TransportErrorKind::Conflict => "CONFLICT",
            TransportErrorKind::RateLimited => "RATE_LIMIT",
            TransportErrorKind::BadRequest => "BAD_REQUEST",
            TransportErrorKind::NotImplemented => "NOT_IMPLEMENTED",
            TransportErrorKind::Server => "SERVER_ERROR",
            TransportErrorKind::Network => "NETWORK_ERROR",
            TransportErrorKind::Timeout => "TIMEOUT",
            TransportErrorKind::Decode => "DECODE_ERROR",
            TransportErrorKind::Other => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// Error returned by a transport call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}{}: {message}", status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::from_status(status),
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::from_status(404, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == TransportErrorKind::NotFound
    }

    pub fn is_not_implemented(&self) -> bool {
        self.kind == TransportErrorKind::NotImplemented
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Remote CRUD calls for any resource kind
///
/// The descriptor supplies the collection path for the kind.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Fetch one object
    async fn get(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        name: &str,
    ) -> TransportResult<Envelope>;

    /// Create an object, returning the stored representation
    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        envelope: &Envelope,
    ) -> TransportResult<Envelope>;

    /// Replace an object, returning the stored representation
    async fn update(
        &self,
        descriptor: &ResourceDescriptor,
        envelope: &Envelope,
    ) -> TransportResult<Envelope>;

    /// Delete an object
    async fn delete(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        name: &str,
    ) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_status_codes() {
        assert_eq!(TransportErrorKind::from_status(404), TransportErrorKind::NotFound);
        assert_eq!(TransportErrorKind::from_status(429), TransportErrorKind::RateLimited);
        assert_eq!(
            TransportErrorKind::from_status(501),
            TransportErrorKind::NotImplemented
        );
        assert_eq!(TransportErrorKind::from_status(503), TransportErrorKind::Server);
        assert_eq!(TransportErrorKind::from_status(418), TransportErrorKind::Other);
    }

    #[test]
    fn retryable_kinds() {
        assert!(TransportErrorKind::Server.is_retryable());
        assert!(TransportErrorKind::RateLimited.is_retryable());
        assert!(!TransportErrorKind::NotFound.is_retryable());
        assert!(!TransportErrorKind::NotImplemented.is_retryable());
        assert!(!TransportErrorKind::Unauthorized.is_retryable());
    }

    #[test]
    fn error_display_includes_status() {
        let err = TransportError::from_status(409, "already exists");
        assert_eq!(err.to_string(), "CONFLICT (HTTP 409): already exists");

        let err = TransportError::new(TransportErrorKind::Network, "connection refused");
        assert_eq!(err.to_string(), "NETWORK_ERROR: connection refused");
    }
}
