//! GitHub content loader.
//!
//! Resolves the default branch, lists the recursive tree, and downloads every indexable
//! text file through the contents API. Files that fail individually are skipped so one
//! odd blob cannot abort a whole ingestion.

use crate::repo_id::RepoId;
use futures_util::{StreamExt, stream};
use reqwest::{Client, StatusCode, Url, header};
use serde::Deserialize;
use thiserror::Error;

const FETCH_CONCURRENCY: usize = 8;
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

const IGNORED_DIRECTORIES: &[&str] = &[
    "node_modules",
    "target",
    "dist",
    "build",
    "__pycache__",
    "vendor",
    "venv",
    "env",
];

const INDEXABLE_FILE_NAMES: &[&str] = &[
    "makefile",
    "dockerfile",
    "rakefile",
    "gemfile",
    "readme",
    "license",
    "cmakelists.txt",
];

const INDEXABLE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "tsx", "jsx", "go", "java", "c", "cpp", "cc", "h", "hpp", "cs", "rb",
    "php", "swift", "kt", "kts", "scala", "r", "lua", "sh", "bash", "zsh", "sql", "html", "css",
    "scss", "xml", "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "md", "rst", "txt",
    "proto", "graphql", "vue", "svelte", "ex", "exs", "erl", "hs", "ml", "clj", "tf", "nix",
    "zig", "dart", "jl",
];

/// Errors raised while loading repository content from GitHub.
#[derive(Debug, Error)]
pub enum GithubError {
    /// API base URL could not be used to build request URLs.
    #[error("Invalid GitHub API URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Repository does not exist or the token cannot see it.
    #[error("GitHub repository {0} not found or not accessible")]
    RepositoryNotFound(String),
    /// GitHub responded with an unexpected status code.
    #[error("Unexpected GitHub response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by GitHub.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// A text file fetched from a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDocument {
    /// Repository-relative path.
    pub path: String,
    /// UTF-8 file contents.
    pub content: String,
}

/// Limits and credentials for [`GithubLoader`].
#[derive(Debug, Clone)]
pub struct GithubLoaderSettings {
    /// Base URL of the REST API (`https://api.github.com`).
    pub api_url: String,
    /// Optional token sent as a bearer credential.
    pub token: Option<String>,
    /// Maximum number of files loaded per repository.
    pub max_files: usize,
    /// Files above this size are skipped.
    pub max_file_bytes: u64,
}

/// Loads indexable files of a repository through the GitHub REST API.
pub struct GithubLoader {
    http: Client,
    api_url: Url,
    token: Option<String>,
    max_files: usize,
    max_file_bytes: u64,
}

#[derive(Deserialize)]
struct RepositoryInfo {
    default_branch: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

impl GithubLoader {
    /// Build a loader from the given settings.
    pub fn new(settings: GithubLoaderSettings) -> Result<Self, GithubError> {
        let api_url = Url::parse(&settings.api_url)
            .map_err(|error| GithubError::InvalidUrl(format!("{}: {error}", settings.api_url)))?;
        if api_url.cannot_be_a_base() {
            return Err(GithubError::InvalidUrl(settings.api_url));
        }
        let http = Client::builder().user_agent("repo-chat/0.1").build()?;

        tracing::debug!(
            api_url = %api_url,
            has_token = settings.token.is_some(),
            max_files = settings.max_files,
            "Initialized GitHub loader"
        );

        Ok(Self {
            http,
            api_url,
            token: settings.token.filter(|token| !token.trim().is_empty()),
            max_files: settings.max_files,
            max_file_bytes: settings.max_file_bytes,
        })
    }

    /// Fetch every indexable file of `repo` from its default branch.
    pub async fn load(&self, repo: &RepoId) -> Result<Vec<RepoDocument>, GithubError> {
        let info: RepositoryInfo = self
            .get_json(&["repos", repo.owner(), repo.name()], &[], repo)
            .await?;
        let branch = info.default_branch;

        let tree: TreeResponse = self
            .get_json(
                &["repos", repo.owner(), repo.name(), "git", "trees", branch.as_str()],
                &[("recursive", "1")],
                repo,
            )
            .await?;
        if tree.truncated {
            tracing::warn!(repo = %repo, "GitHub tree listing was truncated; ingesting partial content");
        }

        let candidates: Vec<String> = tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .filter(|entry| entry.size.unwrap_or(0) <= self.max_file_bytes)
            .filter(|entry| is_indexable_path(&entry.path))
            .map(|entry| entry.path)
            .take(self.max_files)
            .collect();

        tracing::info!(
            repo = %repo,
            branch = %branch,
            files = candidates.len(),
            "Fetching repository files"
        );

        let documents: Vec<RepoDocument> = stream::iter(candidates)
            .map(|path| self.fetch_file(repo, &branch, path))
            .buffered(FETCH_CONCURRENCY)
            .filter_map(|document| async move { document })
            .collect()
            .await;

        Ok(documents)
    }

    async fn fetch_file(&self, repo: &RepoId, branch: &str, path: String) -> Option<RepoDocument> {
        let endpoint = {
            let mut segments = vec!["repos", repo.owner(), repo.name(), "contents"];
            segments.extend(path.split('/'));
            self.endpoint(&segments, &[("ref", branch)])
        };
        let url = match endpoint {
            Ok(url) => url,
            Err(error) => {
                tracing::warn!(repo = %repo, path = %path, error = %error, "Skipping file with unusable path");
                return None;
            }
        };

        let result = async {
            let response = self
                .authorize(self.http.get(url))
                .header(header::ACCEPT, RAW_MEDIA_TYPE)
                .send()
                .await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(GithubError::UnexpectedStatus { status, body });
            }
            Ok::<_, GithubError>(response.bytes().await?)
        }
        .await;

        match result {
            Ok(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(content) if !content.trim().is_empty() => Some(RepoDocument { path, content }),
                Ok(_) => None,
                Err(_) => {
                    tracing::debug!(repo = %repo, path = %path, "Skipping non UTF-8 file");
                    None
                }
            },
            Err(error) => {
                tracing::warn!(repo = %repo, path = %path, error = %error, "Failed to fetch file; skipping");
                None
            }
        }
    }

    async fn get_json<T>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        repo: &RepoId,
    ) -> Result<T, GithubError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = self.endpoint(segments, query)?;
        let response = self
            .authorize(self.http.get(url))
            .header(header::ACCEPT, JSON_MEDIA_TYPE)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(GithubError::RepositoryNotFound(repo.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = GithubError::UnexpectedStatus { status, body };
                tracing::error!(repo = %repo, error = %error, "GitHub API request failed");
                Err(error)
            }
        }
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, GithubError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| GithubError::InvalidUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("X-GitHub-Api-Version", API_VERSION);
        match self.token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Whether a repository path looks like text worth indexing.
pub fn is_indexable_path(path: &str) -> bool {
    let mut components: Vec<&str> = path.split('/').collect();
    let Some(file_name) = components.pop() else {
        return false;
    };
    if components
        .iter()
        .any(|dir| dir.starts_with('.') || IGNORED_DIRECTORIES.contains(dir))
    {
        return false;
    }
    if file_name.starts_with('.') {
        return false;
    }

    let lower = file_name.to_lowercase();
    if INDEXABLE_FILE_NAMES.contains(&lower.as_str()) {
        return true;
    }
    lower
        .rsplit_once('.')
        .is_some_and(|(_, ext)| INDEXABLE_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};
    use serde_json::json;

    fn loader(server: &MockServer, token: Option<&str>) -> GithubLoader {
        GithubLoader::new(GithubLoaderSettings {
            api_url: server.url("/api/"),
            token: token.map(str::to_string),
            max_files: 10,
            max_file_bytes: 1_000,
        })
        .expect("loader")
    }

    fn repo() -> RepoId {
        RepoId::parse("foo/bar").expect("valid")
    }

    #[test]
    fn indexable_paths_follow_extension_and_directory_rules() {
        assert!(is_indexable_path("src/main.rs"));
        assert!(is_indexable_path("README.md"));
        assert!(is_indexable_path("Dockerfile"));
        assert!(is_indexable_path("docs/LICENSE"));
        assert!(!is_indexable_path("assets/logo.png"));
        assert!(!is_indexable_path("node_modules/pkg/index.js"));
        assert!(!is_indexable_path(".github/workflows/ci.yml"));
        assert!(!is_indexable_path(".env"));
        assert!(!is_indexable_path("Makefile.bak"));
    }

    #[tokio::test]
    async fn loads_indexable_files_from_default_branch() {
        let server = MockServer::start_async().await;
        let repo_mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/repos/foo/bar")
                    .header("authorization", "Bearer ghp_test");
                then.status(200).json_body(json!({ "default_branch": "trunk" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/repos/foo/bar/git/trees/trunk")
                    .query_param("recursive", "1");
                then.status(200).json_body(json!({
                    "truncated": false,
                    "tree": [
                        { "path": "src", "type": "tree" },
                        { "path": "src/lib.rs", "type": "blob", "size": 20 },
                        { "path": "docs/notes.md", "type": "blob", "size": 12 },
                        { "path": "logo.png", "type": "blob", "size": 10 },
                        { "path": "big.txt", "type": "blob", "size": 5000 }
                    ]
                }));
            })
            .await;
        let lib_mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/repos/foo/bar/contents/src/lib.rs")
                    .query_param("ref", "trunk")
                    .header("accept", RAW_MEDIA_TYPE);
                then.status(200).body("pub fn answer() -> u32 { 42 }");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/repos/foo/bar/contents/docs/notes.md");
                then.status(200).body("# Notes");
            })
            .await;

        let documents = loader(&server, Some("ghp_test"))
            .load(&repo())
            .await
            .expect("load");

        repo_mock.assert_async().await;
        lib_mock.assert_async().await;
        assert_eq!(
            documents,
            vec![
                RepoDocument {
                    path: "src/lib.rs".into(),
                    content: "pub fn answer() -> u32 { 42 }".into(),
                },
                RepoDocument {
                    path: "docs/notes.md".into(),
                    content: "# Notes".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn skips_files_that_fail_to_download() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/repos/foo/bar");
                then.status(200).json_body(json!({ "default_branch": "main" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/repos/foo/bar/git/trees/main");
                then.status(200).json_body(json!({
                    "tree": [
                        { "path": "a.rs", "type": "blob", "size": 1 },
                        { "path": "b.rs", "type": "blob", "size": 1 }
                    ]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/repos/foo/bar/contents/a.rs");
                then.status(500).body("oops");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/repos/foo/bar/contents/b.rs");
                then.status(200).body("fn b() {}");
            })
            .await;

        let documents = loader(&server, None).load(&repo()).await.expect("load");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].path, "b.rs");
    }

    #[tokio::test]
    async fn missing_repository_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/repos/foo/bar");
                then.status(404).json_body(json!({ "message": "Not Found" }));
            })
            .await;

        let error = loader(&server, None)
            .load(&repo())
            .await
            .expect_err("missing repo");
        assert!(matches!(error, GithubError::RepositoryNotFound(ref name) if name == "foo/bar"));
    }
}
