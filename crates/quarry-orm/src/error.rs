//! Error types for the runtime layer.

use quarry_core::CoreError;
use thiserror::Error;

/// Runtime errors.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Statement-building error from the core layer.
    #[error("statement error: {0}")]
    Core(#[from] CoreError),

    /// Database error from sqlx. Constraint violations arrive here
    /// verbatim.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A select or set expression referenced a column outside the
    /// statement's tables.
    #[error("unknown column: {0}")]
    UnknownColumn(String),
}

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, OrmError>;
