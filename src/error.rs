// src/error.rs

use thiserror::Error;

/// Failures raised while turning text into embedding vectors.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to load model from {path}: {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("tensor operation failed: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("embedding produced {actual} rows for {expected} inputs")]
    RowCountMismatch { expected: usize, actual: usize },

    #[error("embedding dimension {actual} does not match provider dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors from the consolidation core. Any of these aborts the run before
/// anything is written to the consolidated layer.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("row {row} is missing required field '{field}'")]
    MissingField { row: usize, field: &'static str },

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
