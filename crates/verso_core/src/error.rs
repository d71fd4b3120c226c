//! Error types for the VersoDB façade.

use std::io;
use thiserror::Error;
use verso_engine::EngineError;

/// Result type for façade operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors surfaced by the VersoDB façade.
///
/// Every public operation returns a `DbResult` rather than panicking; the
/// caller owns all retry policy. Engine failures are folded into this
/// taxonomy by the `From<EngineError>` impl below.
#[derive(Debug, Error)]
pub enum DbError {
    /// Opening or deleting the underlying database failed.
    #[error("connection error: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
    },

    /// A version change or deletion is blocked by another open connection.
    ///
    /// The operation fails instead of waiting; retry after the blocking
    /// connection closes.
    #[error("database is blocked by another open connection")]
    Blocked,

    /// The live schema does not match the declaration after an upgrade.
    #[error("migration failed: {message}")]
    Migration {
        /// Description of what is missing.
        message: String,
    },

    /// A duplicate primary key or unique-index violation.
    #[error("constraint violation: {message}")]
    Constraint {
        /// Description of the violation.
        message: String,
    },

    /// A document or request failed validation.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the failure.
        message: String,
    },

    /// A constraint named an index that does not exist.
    #[error("index not found: {name}")]
    IndexNotFound {
        /// Name of the missing index.
        name: String,
    },

    /// The named collection does not exist.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the missing collection.
        name: String,
    },

    /// A batch operation failed and the whole transaction was rolled back.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for the abort.
        reason: String,
    },

    /// The database is closed.
    #[error("database is closed")]
    Closed,

    /// Snapshot serialization or deserialization failed.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error reading or writing a snapshot file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DbError {
    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a migration error.
    pub fn migration(message: impl Into<String>) -> Self {
        Self::Migration {
            message: message.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an index-not-found error.
    pub fn index_not_found(name: impl Into<String>) -> Self {
        Self::IndexNotFound { name: name.into() }
    }

    /// Creates a collection-not-found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates a transaction-aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }
}

impl From<EngineError> for DbError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::StoreNotFound { name } => DbError::CollectionNotFound { name },
            EngineError::IndexNotFound { name, .. } => DbError::IndexNotFound { name },
            EngineError::Constraint { message } => DbError::Constraint { message },
            EngineError::Data { message } => DbError::Validation { message },
            EngineError::VersionMismatch { requested, current } => DbError::Connection {
                message: format!(
                    "requested version {requested} is below stored version {current}"
                ),
            },
            EngineError::Blocked { .. } => DbError::Blocked,
            EngineError::InvalidState { message } => DbError::TransactionAborted {
                reason: message,
            },
            EngineError::Closed => DbError::Closed,
        }
    }
}
