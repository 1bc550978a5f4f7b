//! Canonical GitHub repository identifiers.
//!
//! Every repository reference entering the service (request bodies, the registry file) is
//! reduced to an `owner/repo` [`RepoId`]. The same string keys the registry and tags the
//! content held by the retrieval backend, so two spellings of one repository must always
//! collapse to the same identifier.
//!
//! Accepted forms:
//!
//! - `https://github.com/owner/repo` and `http://github.com/owner/repo`
//! - `github.com/owner/repo`
//! - `owner/repo`
//! - any of the above with a trailing `.git` or extra path segments (dropped)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const GIT_SUFFIX: &str = ".git";
const HOST_PREFIXES: [&str; 3] = ["https://github.com/", "http://github.com/", "github.com/"];
const KNOWN_HOSTS: [&str; 1] = ["github.com"];

/// Reasons a repository reference could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRepoId {
    /// Input was empty or whitespace only.
    #[error("Empty repository string")]
    Empty,
    /// Input did not reduce to at least `owner/repo`.
    #[error("Invalid repository format. Expected owner/repo or a full GitHub URL.")]
    Malformed,
    /// Owner or repository name was blank after trimming.
    #[error("Invalid repository owner/name")]
    EmptySegment,
}

/// Canonical `owner/repo` identifier for a GitHub repository.
///
/// Case is preserved as supplied; `Foo/Bar` and `foo/bar` are distinct identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    /// Normalize a raw repository reference into its canonical form.
    pub fn parse(raw: &str) -> Result<Self, InvalidRepoId> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidRepoId::Empty);
        }

        let without_suffix = trimmed.strip_suffix(GIT_SUFFIX).unwrap_or(trimmed);
        let without_host = HOST_PREFIXES
            .iter()
            .find_map(|prefix| without_suffix.strip_prefix(prefix))
            .unwrap_or(without_suffix);

        let mut segments = without_host.trim_matches('/').split('/');
        let (Some(owner), Some(name)) = (segments.next(), segments.next()) else {
            return Err(InvalidRepoId::Malformed);
        };

        let owner = owner.trim();
        let mut name = name.trim();
        while let Some(stripped) = name.strip_suffix(GIT_SUFFIX) {
            name = stripped.trim_end();
        }

        if owner.is_empty() || name.is_empty() {
            return Err(InvalidRepoId::EmptySegment);
        }
        if KNOWN_HOSTS.contains(&owner) {
            return Err(InvalidRepoId::Malformed);
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// Account or organization that owns the repository.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name without the owner.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoId {
    type Err = InvalidRepoId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RepoId {
    type Error = InvalidRepoId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RepoId> for String {
    fn from(value: RepoId) -> Self {
        value.to_string()
    }
}
