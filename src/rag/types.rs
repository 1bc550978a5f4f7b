//! Request, outcome, and error types for the retrieval pipeline.

use crate::{
    embedding::EmbeddingClientError, github::GithubError, llm::CompletionError,
    qdrant::QdrantError, repo_id::RepoId,
};
use anyhow::Error as TokenizerError;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Payload key tagging ingested chunks with their canonical repository identifier.
pub const REPO_TAG: &str = "github_repo";

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Embedding model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors emitted by the retrieval pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// Shared HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    /// Repository content could not be loaded.
    #[error("Failed to load repository content: {0}")]
    Loader(#[from] GithubError),
    /// Chunking step failed to segment content.
    #[error("Failed to chunk content: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors.
    #[error("{0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector store interaction failed.
    #[error("Vector store request failed: {0}")]
    Store(#[from] QdrantError),
    /// Completion provider failed to produce an answer.
    #[error("{0}")]
    Completion(#[from] CompletionError),
    /// Returned embedding dimension does not match configuration.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured for the collection.
        expected: usize,
        /// Dimension returned by the provider.
        actual: usize,
    },
    /// Provider returned no vector for the question.
    #[error("Embedding provider returned no vector for the question")]
    EmptyEmbedding,
    /// Provider returned a different number of vectors than inputs.
    #[error("Embedding provider returned {actual} vectors for {expected} inputs")]
    EmbeddingCountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },
}

/// Kind of content an ingestion request refers to; selects the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Files of a GitHub repository.
    GithubRepo,
}

impl ContentKind {
    /// Value recorded as `data_type` on every ingested chunk.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GithubRepo => "github",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the pipeline needs to ingest one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    /// Human-readable descriptor, e.g. `repo:owner/name type:repo`.
    pub source: String,
    /// Which loader handles the source.
    pub kind: ContentKind,
    /// Repository to load.
    pub repo: RepoId,
    /// Tags stored with every chunk, later used to scope queries.
    pub tags: BTreeMap<String, String>,
}

impl IngestRequest {
    /// Request ingestion of a GitHub repository tagged with its canonical identifier.
    pub fn github_repo(repo: &RepoId) -> Self {
        Self {
            source: format!("repo:{repo} type:repo"),
            kind: ContentKind::GithubRepo,
            repo: repo.clone(),
            tags: BTreeMap::from([(REPO_TAG.to_string(), repo.to_string())]),
        }
    }
}

/// Exact-match conditions restricting which chunks may answer a question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFilter(BTreeMap<String, String>);

impl ScopeFilter {
    /// Scope to content ingested for `repo`.
    pub fn repo(repo: &RepoId) -> Self {
        Self(BTreeMap::from([(REPO_TAG.to_string(), repo.to_string())]))
    }

    /// Underlying key/value conditions.
    pub fn conditions(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Files loaded from the source.
    pub documents: usize,
    /// Chunks embedded and stored.
    pub chunks: usize,
    /// Chunks dropped because identical text was already queued.
    pub skipped_duplicates: usize,
}
