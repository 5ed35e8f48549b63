//! Adapter error types
//!
//! Every failure surfaced by the planner, fetchers, loader and transaction
//! buffer is an [`AdapterError`] carrying a stable machine-readable code.
//!
//! Error codes:
//! - DQ_CONFIG_INVALID (FATAL)
//! - DQ_MISSING_TABLE (FATAL)
//! - DQ_MISSING_PRIMARY_KEY (FATAL)
//! - DQ_MISSING_PLAN_INPUT (FATAL)
//! - DQ_UNSUPPORTED_OPERATOR (REJECT)
//! - DQ_MISSING_KEY_CONDITION (REJECT)
//! - DQ_SCAN_PAGE_LIMIT (LIMIT)
//! - DQ_TRANSACTION_LIMIT (LIMIT)
//! - DQ_TRANSACTION_CLOSED (REJECT)
//! - DQ_BATCH_GET_UNPROCESSED (ERROR)
//! - DQ_INVALID_UPDATE (REJECT)
//! - DQ_STORE_FAILED (ERROR)

use std::fmt;

use crate::store::StoreError;

/// Severity levels for adapter errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Misconfiguration or missing precondition, detected before any I/O
    Fatal,
    /// Query shape or input rejected
    Reject,
    /// An explicit safety cap was hit
    Limit,
    /// The store failed or kept refusing work
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Fatal => write!(f, "FATAL"),
            Severity::Reject => write!(f, "REJECT"),
            Severity::Limit => write!(f, "LIMIT"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Stable adapter error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorCode {
    /// Invalid configuration value
    ConfigInvalid,
    /// No table registered for a model
    MissingTable,
    /// No primary key schema registered for a model
    MissingPrimaryKey,
    /// A plan input (model name, limit, join field) is missing
    MissingPlanInput,
    /// Operator name not in the registry
    UnsupportedOperator,
    /// A query strategy was chosen but no key condition could be built
    MissingKeyCondition,
    /// Paginated fetch exceeded the configured page budget
    ScanPageLimit,
    /// Transaction buffer already holds the maximum number of operations
    TransactionLimit,
    /// Transaction buffer was committed or aborted
    TransactionClosed,
    /// Batch get kept returning unprocessed keys
    BatchGetUnprocessed,
    /// Update diff was empty or could not be serialized
    InvalidUpdate,
    /// Store request failed
    StoreFailed,
}

impl AdapterErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            AdapterErrorCode::ConfigInvalid => "DQ_CONFIG_INVALID",
            AdapterErrorCode::MissingTable => "DQ_MISSING_TABLE",
            AdapterErrorCode::MissingPrimaryKey => "DQ_MISSING_PRIMARY_KEY",
            AdapterErrorCode::MissingPlanInput => "DQ_MISSING_PLAN_INPUT",
            AdapterErrorCode::UnsupportedOperator => "DQ_UNSUPPORTED_OPERATOR",
            AdapterErrorCode::MissingKeyCondition => "DQ_MISSING_KEY_CONDITION",
            AdapterErrorCode::ScanPageLimit => "DQ_SCAN_PAGE_LIMIT",
            AdapterErrorCode::TransactionLimit => "DQ_TRANSACTION_LIMIT",
            AdapterErrorCode::TransactionClosed => "DQ_TRANSACTION_CLOSED",
            AdapterErrorCode::BatchGetUnprocessed => "DQ_BATCH_GET_UNPROCESSED",
            AdapterErrorCode::InvalidUpdate => "DQ_INVALID_UPDATE",
            AdapterErrorCode::StoreFailed => "DQ_STORE_FAILED",
        }
    }

    /// Returns the severity level for this code
    pub fn severity(&self) -> Severity {
        match self {
            AdapterErrorCode::ConfigInvalid
            | AdapterErrorCode::MissingTable
            | AdapterErrorCode::MissingPrimaryKey
            | AdapterErrorCode::MissingPlanInput => Severity::Fatal,
            AdapterErrorCode::UnsupportedOperator
            | AdapterErrorCode::MissingKeyCondition
            | AdapterErrorCode::TransactionClosed
            | AdapterErrorCode::InvalidUpdate => Severity::Reject,
            AdapterErrorCode::ScanPageLimit | AdapterErrorCode::TransactionLimit => {
                Severity::Limit
            }
            AdapterErrorCode::BatchGetUnprocessed | AdapterErrorCode::StoreFailed => {
                Severity::Error
            }
        }
    }
}

impl fmt::Display for AdapterErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Adapter error with code and context
#[derive(Debug, Clone)]
pub struct AdapterError {
    code: AdapterErrorCode,
    message: String,
    source: Option<StoreError>,
}

impl AdapterError {
    fn new(code: AdapterErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error
    pub fn config_invalid(reason: impl Into<String>) -> Self {
        Self::new(AdapterErrorCode::ConfigInvalid, reason)
    }

    /// Create a missing table error
    pub fn missing_table(model: &str) -> Self {
        Self::new(
            AdapterErrorCode::MissingTable,
            format!("No table registered for model '{}'", model),
        )
    }

    /// Create a missing primary key error
    pub fn missing_primary_key(model: &str) -> Self {
        Self::new(
            AdapterErrorCode::MissingPrimaryKey,
            format!("No primary key registered for model '{}'", model),
        )
    }

    /// Create a missing plan input error
    pub fn missing_plan_input(reason: impl Into<String>) -> Self {
        Self::new(AdapterErrorCode::MissingPlanInput, reason)
    }

    /// Create an unsupported operator error
    pub fn unsupported_operator(operator: &str) -> Self {
        Self::new(
            AdapterErrorCode::UnsupportedOperator,
            format!("Operator '{}' is not supported", operator),
        )
    }

    /// Create a missing key condition error
    pub fn missing_key_condition(model: &str) -> Self {
        Self::new(
            AdapterErrorCode::MissingKeyCondition,
            format!("No key condition could be built for model '{}'", model),
        )
    }

    /// Create a scan page limit error
    pub fn scan_page_limit(max_pages: usize) -> Self {
        Self::new(
            AdapterErrorCode::ScanPageLimit,
            format!("Fetch exceeded the maximum of {} pages", max_pages),
        )
    }

    /// Create a transaction limit error
    pub fn transaction_limit(max: usize) -> Self {
        Self::new(
            AdapterErrorCode::TransactionLimit,
            format!("Transaction cannot hold more than {} operations", max),
        )
    }

    /// Create a transaction closed error
    pub fn transaction_closed() -> Self {
        Self::new(
            AdapterErrorCode::TransactionClosed,
            "Transaction was already committed or aborted",
        )
    }

    /// Create a batch get unprocessed error
    pub fn batch_get_unprocessed(remaining: usize, attempts: u32) -> Self {
        Self::new(
            AdapterErrorCode::BatchGetUnprocessed,
            format!(
                "{} keys still unprocessed after {} attempts",
                remaining, attempts
            ),
        )
    }

    /// Create an invalid update error
    pub fn invalid_update(reason: impl Into<String>) -> Self {
        Self::new(AdapterErrorCode::InvalidUpdate, reason)
    }

    /// Wrap a store failure
    pub fn store(err: StoreError) -> Self {
        Self {
            code: AdapterErrorCode::StoreFailed,
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> AdapterErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the underlying store error, if any
    pub fn store_error(&self) -> Option<&StoreError> {
        self.source.as_ref()
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for AdapterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<StoreError> for AdapterError {
    fn from(err: StoreError) -> Self {
        Self::store(err)
    }
}

/// Result type for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;
