//! Retrieval-augmented ingestion and question answering.

pub(crate) mod chunking;
pub(crate) mod prompt;
pub mod service;
pub mod types;

pub use service::{RagApi, RagService};
pub use types::{
    ChunkingError, ContentKind, IngestOutcome, IngestRequest, REPO_TAG, RagError, ScopeFilter,
};
