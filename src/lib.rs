use thiserror::Error;

pub type Result<T> = std::result::Result<T, LandmarkError>;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transient service error: {0}")]
    Transient(String),

    #[error("Permanent service error: {0}")]
    Permanent(String),

    #[error(
        "Metadata for document {document_id} chunk {chunk_index} is {size} bytes, over the {limit} byte ceiling"
    )]
    MetadataOverflow {
        document_id: String,
        chunk_index: usize,
        size: usize,
        limit: usize,
    },

    #[error("{failed} of {total} chunks failed to embed")]
    EmbeddingPartialFailure { failed: usize, total: usize },

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl LandmarkError {
    /// Whether the error is worth retrying with backoff.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, LandmarkError::Transient(_))
    }
}

pub mod chunking;
pub mod commands;
pub mod config;
pub mod documents;
pub mod embeddings;
pub mod ids;
pub mod metadata;
pub mod pipeline;
pub mod query;
pub mod retry;
pub mod store;
