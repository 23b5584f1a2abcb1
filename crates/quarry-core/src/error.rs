/// Top-level error type for the Quarry workspace.
///
/// Validation kinds (`NotInitialized`, `DimensionMismatch`, `HandleNotFound`,
/// `InvalidArgument`) are deterministic and must never be retried.
#[derive(Debug, thiserror::Error)]
pub enum QuarryError {
    /// A vector index operation was attempted before `initialize`.
    #[error("Vector index is not initialized")]
    NotInitialized,

    /// A vector did not have the dimension the operation requires.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimension the operation required.
        expected: usize,
        /// The dimension that was supplied.
        actual: usize,
    },

    /// A named vector handle could not be resolved.
    #[error("Named vector not found: {0}")]
    HandleNotFound(String),

    /// The embedding provider failed permanently (after any retries).
    #[error("Provider error: {0}")]
    Provider(String),

    /// The persisted vector index could not be read, decoded, or written.
    #[error("Index persistence error: {0}")]
    IndexPersistence(String),

    /// A caller supplied an argument outside the accepted domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An error from a document or named-vector store backend.
    #[error("Store error: {0}")]
    Store(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from an outbound HTTP request (e.g. an embeddings API call).
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuarryError {
    /// Returns `true` for deterministic validation failures that a caller
    /// must not retry.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            QuarryError::NotInitialized
                | QuarryError::DimensionMismatch { .. }
                | QuarryError::HandleNotFound(_)
                | QuarryError::InvalidArgument(_)
        )
    }
}

/// A convenience `Result` alias using [`QuarryError`].
pub type QuarryResult<T> = Result<T, QuarryError>;

/// Fails with [`QuarryError::DimensionMismatch`] unless `actual == expected`.
pub fn ensure_dimension(expected: usize, actual: usize) -> QuarryResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(QuarryError::DimensionMismatch { expected, actual })
    }
}
