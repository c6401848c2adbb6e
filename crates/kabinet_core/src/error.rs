//! Error types for Kabinet stores.

use kabinet_engine::{EngineError, ErrorCode};
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The engine reported a failure.
    #[error("{message} ({})", .code.as_i32())]
    Cabinet {
        /// Engine error code.
        code: ErrorCode,
        /// Engine message, with detail when the engine supplied one.
        message: String,
    },

    /// Transaction API misuse.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Malformed query, unknown operator or invalid pagination.
    #[error("query error: {0}")]
    Query(String),

    /// `fetch` found no record and no default was supplied.
    #[error("key not found")]
    KeyNotFound,

    /// Unknown secondary index type.
    #[error("index error: {0}")]
    Index(String),

    /// Argument not accepted by this store.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The store was already closed.
    #[error("database is closed")]
    Closed,

    /// I/O error outside the engine.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Early exit raised by `commit` or `abort` inside a transaction block.
    ///
    /// Propagate it with `?`; the enclosing transaction consumes it.
    #[doc(hidden)]
    #[error("transaction finished early")]
    TransactionFinished(FinishSignal),
}

/// Token carried by [`CoreError::TransactionFinished`].
///
/// Only this crate can create one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishSignal(());

impl FinishSignal {
    pub(crate) const fn new() -> Self {
        Self(())
    }
}

impl CoreError {
    /// Creates a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }

    /// Creates a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }

    /// Creates an index error.
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index(message.into())
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns the engine error code for [`CoreError::Cabinet`] errors.
    #[must_use]
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Cabinet { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub(crate) const fn is_finish_signal(&self) -> bool {
        matches!(self, Self::TransactionFinished(_))
    }
}

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        let message = match err.detail {
            Some(detail) => format!("{}: {detail}", err.code.message()),
            None => err.code.message().to_string(),
        };
        Self::Cabinet {
            code: err.code,
            message,
        }
    }
}
