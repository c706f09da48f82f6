//! Error types
//!
//! Every fallible boundary in the crate (checkpoint loading, prompt encoding,
//! forward passes, generation) reports through [`QuillError`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuillError {
    #[error("Failed to load model: {0}")]
    CheckpointLoad(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Sequence length exceeded: max {max}, actual {actual}")]
    SequenceLengthExceeded { max: usize, actual: usize },

    #[error("Token id {id} out of range for vocabulary of size {vocab_size}")]
    TokenOutOfRange { id: usize, vocab_size: usize },

    #[error("Empty input: {0}")]
    EmptyInput(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QuillError>;
