//! Helpers for constructing and hashing Qdrant payloads.

use crate::qdrant::types::PointTags;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Build the payload object stored alongside each indexed chunk.
///
/// Tag entries are inserted first so the structural fields always win on key collisions.
pub(crate) fn build_payload(
    text: &str,
    path: &str,
    chunk_hash: &str,
    timestamp_rfc3339: &str,
    tags: &PointTags,
) -> Value {
    let mut payload = Map::new();
    for (key, value) in &tags.tags {
        payload.insert(key.clone(), Value::String(value.clone()));
    }
    payload.insert("text".into(), Value::String(text.to_string()));
    payload.insert("path".into(), Value::String(path.to_string()));
    payload.insert("chunk_hash".into(), Value::String(chunk_hash.to_string()));
    payload.insert(
        "timestamp".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    if !tags.data_type.is_empty() {
        payload.insert("data_type".into(), Value::String(tags.data_type.clone()));
    }

    Value::Object(payload)
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Stable point id for one chunk of one tagged source.
///
/// Re-indexing the same chunk overwrites its point instead of adding a second copy.
pub(crate) fn chunk_point_id(tags: &PointTags, path: &str, chunk_hash: &str) -> String {
    let mut name = format!("repo-chat:{}", tags.data_type);
    for (key, value) in &tags.tags {
        name.push_str(&format!("\n{key}={value}"));
    }
    name.push_str(&format!("\npath={path}\nchunk={chunk_hash}"));
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}
