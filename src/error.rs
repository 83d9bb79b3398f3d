//! Error taxonomy for the ragbase core.
//!
//! Every fallible core operation resolves to one of these variants so the
//! outer surfaces (HTTP, CLI) can map failures to structured responses
//! without inspecting error strings.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem create/copy/delete failures inside a knowledge base.
    #[error("directory operation failed: {0}")]
    Directory(String),

    /// All clone strategies (retries, mirrors, tool fallback) exhausted.
    /// Carries the last underlying cause.
    #[error("repository unavailable: {0}")]
    RepositoryUnavailable(String),

    /// The embedding provider rejected a request or could not be reached.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// The generation service rejected a request or could not be reached.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// Vector index storage failure.
    #[error("vector index error: {0}")]
    Index(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
