//! Error types for the Tablesync engine.

use crate::OperationId;
use thiserror::Error;

/// All possible errors from the Tablesync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Addressing errors
    #[error("invalid table key: {0}")]
    InvalidTableKey(String),

    // Queue errors
    #[error("operation not found: {0}")]
    OperationNotFound(OperationId),

    #[error("operation {0} is not a create")]
    NotACreate(OperationId),

    // State errors
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
