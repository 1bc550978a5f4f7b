//! Request and response shapes for the Qdrant REST calls made during ingestion and retrieval.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Failures talking to the vector store.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// `QDRANT_URL` could not be parsed as an absolute URL.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// Connection, timeout, or body decoding failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Any non-success status, with the response text kept for the logs.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// Status Qdrant answered with.
        status: StatusCode,
        /// Response text, possibly empty.
        body: String,
    },
}

/// One embedded chunk waiting to be upserted.
#[derive(Debug, Clone)]
pub struct PointInsert {
    /// Chunk text as stored in the `text` payload field.
    pub text: String,
    /// File the chunk was cut from, relative to the repository root.
    pub path: String,
    /// SHA-256 of `text`; also part of the point id.
    pub chunk_hash: String,
    /// Vector returned by the embedding provider.
    pub vector: Vec<f32>,
}

/// Payload fields shared by every point of one ingestion.
#[derive(Debug, Clone, Default)]
pub struct PointTags {
    /// Stored as `data_type` when non-empty.
    pub data_type: String,
    /// Copied into each payload; `github_repo` is what scoped search filters on.
    pub tags: BTreeMap<String, String>,
}

/// Retrieved chunk with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Point id rendered as a string (Qdrant allows UUIDs or integers).
    pub id: String,
    /// Cosine similarity to the question vector.
    pub score: f32,
    /// Stored payload, absent when the query did not request it.
    pub payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

// `points/query` nests hits under `points`; `points/search` returns the list directly.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
