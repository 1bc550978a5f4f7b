use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const OLLAMA_BATCH_SIZE: usize = 32;
const OPENAI_BATCH_SIZE: usize = 64;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient {
    /// Produce an embedding vector for each supplied chunk of text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Embeddings served by a local Ollama runtime (`POST /api/embed`).
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Create a client for the runtime at `base_url` using `model`.
    pub fn new(http: Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(OLLAMA_BATCH_SIZE) {
            let response = self
                .http
                .post(self.endpoint())
                .json(&OllamaEmbedRequest {
                    model: &self.model,
                    input: batch,
                    truncate: true,
                })
                .send()
                .await
                .map_err(|error| {
                    EmbeddingClientError::ProviderUnavailable(format!(
                        "failed to reach Ollama at {}: {error}",
                        self.base_url
                    ))
                })?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(EmbeddingClientError::GenerationFailed(format!(
                    "Ollama returned {status}: {body}"
                )));
            }

            let body: OllamaEmbedResponse = response.json().await.map_err(|error| {
                EmbeddingClientError::InvalidResponse(format!(
                    "failed to decode Ollama response: {error}"
                ))
            })?;
            embeddings.extend(body.embeddings);
        }

        Ok(embeddings)
    }
}

/// Embeddings served by an OpenAI-compatible API (`POST /v1/embeddings`).
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiEmbeddingClient {
    /// Create a client for the API at `base_url`.
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(OPENAI_BATCH_SIZE) {
            let mut request = self.http.post(self.endpoint()).json(&OpenAiEmbedRequest {
                model: &self.model,
                input: batch,
            });
            if let Some(key) = self.api_key.as_deref() {
                request = request.bearer_auth(key);
            }

            let response = request.send().await.map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(EmbeddingClientError::GenerationFailed(format!(
                    "embeddings API returned {status}: {body}"
                )));
            }

            let body: OpenAiEmbedResponse = response.json().await.map_err(|error| {
                EmbeddingClientError::InvalidResponse(format!(
                    "failed to decode embeddings response: {error}"
                ))
            })?;
            let mut data = body.data;
            data.sort_by_key(|item| item.index);
            embeddings.extend(data.into_iter().map(|item| item.embedding));
        }

        Ok(embeddings)
    }
}

/// Build an embedding client suitable for the current configuration.
pub fn get_embedding_client(config: &Config, http: Client) -> Box<dyn EmbeddingClient + Send + Sync> {
    tracing::debug!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Selecting embedding client"
    );
    match config.embedding_provider {
        EmbeddingProvider::Ollama => Box::new(OllamaEmbeddingClient::new(
            http,
            config.ollama_url.clone(),
            config.embedding_model.clone(),
        )),
        EmbeddingProvider::OpenAI => Box::new(OpenAiEmbeddingClient::new(
            http,
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.embedding_model.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    #[tokio::test]
    async fn ollama_client_returns_vectors_in_order() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/embed")
                    .json_body_partial(r#"{"model":"nomic-embed-text","truncate":true}"#);
                then.status(200).json_body(json!({
                    "embeddings": [[0.1, 0.2], [0.3, 0.4]]
                }));
            })
            .await;

        let client = OllamaEmbeddingClient::new(Client::new(), server.base_url(), "nomic-embed-text");
        let vectors = client
            .generate_embeddings(vec!["alpha".into(), "beta".into()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn ollama_client_surfaces_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(404).body("model not found");
            })
            .await;

        let client = OllamaEmbeddingClient::new(Client::new(), server.base_url(), "missing");
        let error = client
            .generate_embeddings(vec!["alpha".into()])
            .await
            .expect_err("error status");
        assert!(
            matches!(error, EmbeddingClientError::GenerationFailed(ref message) if message.contains("404"))
        );
    }

    #[tokio::test]
    async fn openai_client_sends_bearer_and_sorts_by_index() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer sk-test");
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [2.0] },
                        { "index": 0, "embedding": [1.0] }
                    ]
                }));
            })
            .await;

        let client = OpenAiEmbeddingClient::new(
            Client::new(),
            server.base_url(),
            Some("sk-test".into()),
            "text-embedding-3-small",
        );
        let vectors = client
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }
}
