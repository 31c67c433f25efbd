//! # Error Types
//!
//! Crate-wide error handling built on thiserror. Layer-specific errors
//! (queue, processing, persistence, configuration, circuit breaker) convert
//! into [`DocflowError`] at the seams where they cross into the core.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::queue::QueueError;
use crate::services::StoreError;

/// Top-level error type for the scheduling core
#[derive(Error, Debug)]
pub enum DocflowError {
    /// Durable queue could not be reached; the submission was not accepted
    #[error("Queue unavailable: {message}")]
    QueueUnavailable { message: String },

    /// Queue accepted the request but the operation failed
    #[error("Queue operation failed: {operation}: {message}")]
    QueueOperation { operation: String, message: String },

    /// Persistence collaborator failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Worker lifecycle collaborator failure
    #[error("Worker lifecycle error: {0}")]
    WorkerLifecycle(String),

    /// Component used in an invalid lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Bounded wait elapsed
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Circuit breaker rejected the call
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Event channel closed before a reply arrived
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Invalid or unreadable configuration
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl From<QueueError> for DocflowError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Unavailable { message } => DocflowError::QueueUnavailable { message },
            QueueError::Operation { operation, message } => {
                DocflowError::QueueOperation { operation, message }
            }
        }
    }
}

impl From<StoreError> for DocflowError {
    fn from(err: StoreError) -> Self {
        DocflowError::Persistence(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DocflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_unavailable_maps_to_dedicated_variant() {
        let err: DocflowError = QueueError::Unavailable {
            message: "connection refused".to_string(),
        }
        .into();

        assert!(matches!(err, DocflowError::QueueUnavailable { .. }));
        assert_eq!(err.to_string(), "Queue unavailable: connection refused");
    }

    #[test]
    fn test_store_error_becomes_persistence_error() {
        let err: DocflowError = StoreError::Unavailable("db down".to_string()).into();
        assert!(matches!(err, DocflowError::Persistence(_)));
    }
}
