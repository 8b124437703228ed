//! Error types for statement compilation.

use thiserror::Error;

/// Errors raised while building schemas or compiling statements.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The placeholder pool for one statement is exhausted.
    ///
    /// SQLite refuses statements with more bound variables than
    /// `SQLITE_LIMIT_VARIABLE_NUMBER` (999 by default). This is fatal to
    /// the statement being compiled; the caller must shard the operation
    /// (fewer IN-list elements, fewer batched rows).
    #[error("bound-parameter capacity exceeded (limit: {capacity})")]
    ParamCapacity {
        /// The pool capacity that was exhausted.
        capacity: usize,
    },

    /// A placeholder token appears in a statement without a bound value.
    #[error("placeholder {0} was reserved but never bound")]
    UnboundPlaceholder(String),

    /// A per-column value transform rejected its input.
    #[error("transform failed for column '{column}': {message}")]
    Transform {
        /// The column whose transform failed.
        column: String,
        /// What went wrong.
        message: String,
    },

    /// A condition document has a shape that cannot be parsed.
    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    /// Schema builder misuse.
    #[error("invalid schema: {0}")]
    Schema(String),
}

/// Result type alias for compilation operations.
pub type Result<T> = std::result::Result<T, CoreError>;
