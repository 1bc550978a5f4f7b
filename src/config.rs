use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value that failed to parse.
        value: String,
    },
}

/// Runtime configuration for the repo-chat server and its retrieval backend.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub host: String,
    /// Port the HTTP server listens on.
    pub port: u16,
    /// Default log filter when `RUST_LOG` is not set.
    pub log_level: Option<String>,
    /// Debug mode: verbose logging by default.
    pub debug: bool,
    /// JSON document holding the repository registry.
    pub repos_file: PathBuf,
    /// Optional token used by the GitHub content loader.
    pub github_token: Option<String>,
    /// Base URL of the GitHub REST API.
    pub github_api_url: String,
    /// Maximum number of files ingested per repository.
    pub github_max_files: usize,
    /// Files larger than this many bytes are skipped during ingestion.
    pub github_max_file_bytes: u64,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection holding repository chunks.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// API key for OpenAI-compatible providers.
    pub openai_api_key: Option<String>,
    /// Base URL for OpenAI-compatible providers.
    pub openai_base_url: String,
    /// Provider used to synthesize answers.
    pub llm_provider: LlmProvider,
    /// Model used to synthesize answers.
    pub llm_model: String,
    /// Optional override for the automatic chunk size selection.
    pub text_splitter_chunk_size: Option<usize>,
    /// Token overlap between adjacent chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Number of chunks retrieved to answer a question.
    pub retrieval_top_k: usize,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible embeddings API.
    OpenAI,
}

/// Supported answer-synthesis backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible chat completions API.
    OpenAI,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            log_level: None,
            debug: false,
            repos_file: PathBuf::from("repos.json"),
            github_token: None,
            github_api_url: "https://api.github.com".into(),
            github_max_files: 1000,
            github_max_file_bytes: 1_048_576,
            qdrant_url: "http://127.0.0.1:6333".into(),
            qdrant_collection_name: "repo-chat".into(),
            qdrant_api_key: None,
            embedding_provider: EmbeddingProvider::Ollama,
            embedding_model: "nomic-embed-text".into(),
            embedding_dimension: 768,
            ollama_url: DEFAULT_OLLAMA_URL.into(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com".into(),
            llm_provider: LlmProvider::Ollama,
            llm_model: "llama3.1".into(),
            text_splitter_chunk_size: None,
            text_splitter_chunk_overlap: 0,
            retrieval_top_k: 5,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let defaults = Self::default();
        Ok(Self {
            host: vars.string("HOST").unwrap_or(defaults.host),
            port: vars.parse("PORT")?.unwrap_or(defaults.port),
            log_level: vars.string("LOG_LEVEL"),
            debug: vars.flag("APP_DEBUG")?.unwrap_or(defaults.debug),
            repos_file: vars
                .string("REPOS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.repos_file),
            github_token: vars.string("GITHUB_TOKEN"),
            github_api_url: vars
                .string("GITHUB_API_URL")
                .unwrap_or(defaults.github_api_url),
            github_max_files: vars
                .parse("GITHUB_MAX_FILES")?
                .unwrap_or(defaults.github_max_files),
            github_max_file_bytes: vars
                .parse("GITHUB_MAX_FILE_BYTES")?
                .unwrap_or(defaults.github_max_file_bytes),
            qdrant_url: vars.string("QDRANT_URL").unwrap_or(defaults.qdrant_url),
            qdrant_collection_name: vars
                .string("QDRANT_COLLECTION_NAME")
                .unwrap_or(defaults.qdrant_collection_name),
            qdrant_api_key: vars.string("QDRANT_API_KEY"),
            embedding_provider: vars
                .parse("EMBEDDING_PROVIDER")?
                .unwrap_or(defaults.embedding_provider),
            embedding_model: vars
                .string("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: vars
                .parse("EMBEDDING_DIMENSION")?
                .unwrap_or(defaults.embedding_dimension),
            ollama_url: vars.string("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            openai_api_key: vars.string("OPENAI_API_KEY"),
            openai_base_url: vars
                .string("OPENAI_BASE_URL")
                .unwrap_or(defaults.openai_base_url),
            llm_provider: vars
                .parse("LLM_PROVIDER")?
                .unwrap_or(defaults.llm_provider),
            llm_model: vars.string("LLM_MODEL").unwrap_or(defaults.llm_model),
            text_splitter_chunk_size: vars.parse("TEXT_SPLITTER_CHUNK_SIZE")?,
            text_splitter_chunk_overlap: vars
                .parse("TEXT_SPLITTER_CHUNK_OVERLAP")?
                .unwrap_or(defaults.text_splitter_chunk_overlap),
            retrieval_top_k: vars
                .parse("RETRIEVAL_TOP_K")?
                .unwrap_or(defaults.retrieval_top_k),
        })
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.string(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: key.to_string(),
                        value,
                    })
            })
            .transpose()
    }

    fn flag(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.string(key)
            .map(|value| match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value,
                }),
            })
            .transpose()
    }
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from `.env` and the environment, let `overrides` adjust it (command-line
/// flags), then install it in the global cache.
///
/// Returns the cached configuration; calling this twice keeps the first value.
pub fn init_config<F>(overrides: F) -> Result<&'static Config, ConfigError>
where
    F: FnOnce(&mut Config),
{
    dotenvy::dotenv().ok();
    let mut config = Config::from_env()?;
    overrides(&mut config);
    Ok(CONFIG.get_or_init(|| config))
}
