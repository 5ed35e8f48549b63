//! Store failure types

use thiserror::Error;

/// Error signatures the store uses for transient or throttling failures.
const RETRYABLE_CODES: &[&str] = &[
    "ProvisionedThroughputExceeded",
    "Throttling",
    "RequestLimitExceeded",
    "InternalServerError",
    "ServiceUnavailable",
];

/// Failure reported by a [`StoreClient`](super::StoreClient)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Store rejected request ({code}): {message}")]
    Service { code: String, message: String },

    #[error("Transaction canceled: {0}")]
    TransactionCanceled(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl StoreError {
    /// Create a service error with the store's error code
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Store error code, if the store supplied one
    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the failure matches the transient allow-list.
    ///
    /// Matching is by substring so both `ThrottlingException` and
    /// `Throttling` qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Service { code, .. } => {
                RETRYABLE_CODES.iter().any(|sig| code.contains(sig))
            }
            _ => false,
        }
    }
}
