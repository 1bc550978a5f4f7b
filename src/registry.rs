//! Durable list of repositories that have been registered for ingestion.
//!
//! The registry is an insertion-ordered, duplicate-free sequence of [`RepoId`]s. The default
//! backend is a single JSON array on disk; callers only see the [`RepoRegistry`] trait so a
//! stronger store can replace it without touching the HTTP layer.

use crate::repo_id::RepoId;
use async_trait::async_trait;
use std::collections::HashSet;
use std::ffi::OsString;
use std::hash::Hash;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors raised while persisting the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Registry contents could not be encoded as JSON.
    #[error("Failed to encode repository registry: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Registry file could not be written or replaced.
    #[error("Failed to write repository registry {}: {source}", .path.display())]
    Write {
        /// File the registry was being written to.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
}

/// Result of [`RepoRegistry::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    /// Registry contents after the call.
    pub repos: Vec<RepoId>,
    /// Whether the identifier was already registered (nothing was written).
    pub already_present: bool,
}

/// Storage contract for the repository registry.
#[async_trait]
pub trait RepoRegistry: Send + Sync {
    /// Read the registered repositories in insertion order.
    ///
    /// Never fails: missing or unreadable storage yields an empty list.
    async fn load(&self) -> Vec<RepoId>;

    /// Replace the stored list, dropping duplicates while keeping first occurrences.
    async fn save(&self, repos: Vec<RepoId>) -> Result<(), RegistryError>;

    /// Append `repo` unless it is already registered.
    async fn add(&self, repo: RepoId) -> Result<AddOutcome, RegistryError>;

    /// Whether `repo` is currently registered.
    async fn contains(&self, repo: &RepoId) -> bool {
        self.load().await.contains(repo)
    }
}

/// Registry persisted as a pretty-printed JSON array of `owner/repo` strings.
///
/// Writes go to a sibling staging file that is then renamed over the target, so readers
/// observe either the previous or the new complete document. Mutations within one process
/// are serialized so concurrent `add` calls cannot lose each other's updates.
pub struct JsonFileRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileRegistry {
    /// Create a registry backed by the JSON document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the backing JSON document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw stored entries, including any that no longer normalize.
    async fn read_entries(&self) -> Vec<String> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %error,
                    "Failed to read repository registry; returning empty list"
                );
                return Vec::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %error,
                    "Repository registry is not a JSON array of strings; returning empty list"
                );
                Vec::new()
            }
        }
    }

    async fn write_entries(&self, entries: Vec<String>) -> Result<Vec<String>, RegistryError> {
        let entries = dedupe(entries);
        let body = serde_json::to_vec_pretty(&entries)?;
        let write_error = |source| RegistryError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
        }

        let staging = staging_path(&self.path);
        tokio::fs::write(&staging, body).await.map_err(write_error)?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(write_error)?;

        tracing::debug!(
            path = %self.path.display(),
            count = entries.len(),
            "Repository registry saved"
        );
        Ok(entries)
    }
}

#[async_trait]
impl RepoRegistry for JsonFileRegistry {
    async fn load(&self) -> Vec<RepoId> {
        normalize_entries(self.read_entries().await)
    }

    async fn save(&self, repos: Vec<RepoId>) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().await;
        let entries = repos.iter().map(RepoId::to_string).collect();
        self.write_entries(entries).await.map(|_| ())
    }

    async fn add(&self, repo: RepoId) -> Result<AddOutcome, RegistryError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_entries().await;
        let already_present = entries
            .iter()
            .any(|entry| RepoId::parse(entry).is_ok_and(|stored| stored == repo));
        if !already_present {
            entries.push(repo.to_string());
            entries = self.write_entries(entries).await?;
        }

        Ok(AddOutcome {
            repos: dedupe(normalize_entries(entries)),
            already_present,
        })
    }
}

/// Stored entries that normalize, in stored order; the rest are logged and left on disk.
fn normalize_entries(entries: Vec<String>) -> Vec<RepoId> {
    entries
        .into_iter()
        .filter_map(|entry| match RepoId::parse(&entry) {
            Ok(repo) => Some(repo),
            Err(error) => {
                tracing::warn!(entry = %entry, error = %error, "Skipping invalid registry entry");
                None
            }
        })
        .collect()
}

fn dedupe<T>(items: Vec<T>) -> Vec<T>
where
    T: Clone + Eq + Hash,
{
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("repos.json"));
    name.push(".tmp");
    path.with_file_name(name)
}
