//! Error types for engine operations.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the raw engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The named object store does not exist.
    #[error("object store not found: {name}")]
    StoreNotFound {
        /// Name of the store.
        name: String,
    },

    /// The named index does not exist on the store.
    #[error("index not found: {name} on store {store}")]
    IndexNotFound {
        /// Store the index was looked up on.
        store: String,
        /// Name of the index.
        name: String,
    },

    /// A uniqueness constraint was violated.
    #[error("constraint violation: {message}")]
    Constraint {
        /// Description of the violation.
        message: String,
    },

    /// A document or key failed validation.
    #[error("data error: {message}")]
    Data {
        /// Description of the failure.
        message: String,
    },

    /// The requested version is lower than the stored version.
    #[error("version mismatch: requested {requested}, database is at {current}")]
    VersionMismatch {
        /// The version the caller asked for.
        requested: u64,
        /// The version currently stored.
        current: u64,
    },

    /// A version change is blocked by another open connection.
    #[error("database {name} is blocked by another open connection")]
    Blocked {
        /// Name of the database.
        name: String,
    },

    /// Operation not permitted in the current transaction state or mode.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// The connection is closed.
    #[error("connection is closed")]
    Closed,
}

impl EngineError {
    /// Creates a store-not-found error.
    pub fn store_not_found(name: impl Into<String>) -> Self {
        Self::StoreNotFound { name: name.into() }
    }

    /// Creates an index-not-found error.
    pub fn index_not_found(store: impl Into<String>, name: impl Into<String>) -> Self {
        Self::IndexNotFound {
            store: store.into(),
            name: name.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates a version mismatch error.
    pub fn version_mismatch(requested: u64, current: u64) -> Self {
        Self::VersionMismatch { requested, current }
    }

    /// Creates a blocked error.
    pub fn blocked(name: impl Into<String>) -> Self {
        Self::Blocked { name: name.into() }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}
