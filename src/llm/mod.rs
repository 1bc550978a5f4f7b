//! Completion clients used to synthesize answers from retrieved context.
//!
//! Both adapters issue plain HTTP requests: Ollama through `/api/generate` with streaming
//! disabled, OpenAI-compatible servers through `/v1/chat/completions`.

use crate::config::{Config, LlmProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Provider was unreachable or the endpoint does not exist.
    #[error("Completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Prompt passed to a completion provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Instructions framing how the model should answer.
    pub system: String,
    /// Prompt body (context and question).
    pub prompt: String,
}

/// Interface implemented by answer-synthesis providers.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate a completion for the request, returning the model's text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

/// Build the completion client selected by configuration.
pub fn get_completion_client(config: &Config, http: Client) -> Box<dyn CompletionClient> {
    match config.llm_provider {
        LlmProvider::Ollama => Box::new(OllamaCompletionClient {
            http,
            base_url: config.ollama_url.clone(),
            model: config.llm_model.clone(),
        }),
        LlmProvider::OpenAI => Box::new(OpenAiCompletionClient {
            http,
            base_url: config.openai_base_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.llm_model.clone(),
        }),
    }
}

struct OllamaCompletionClient {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl CompletionClient for OllamaCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let endpoint = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "system": request.system,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": 0.2,
            }
        });

        let response = self
            .http
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                CompletionError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CompletionError::ProviderUnavailable(format!(
                "Ollama endpoint {endpoint} returned 404"
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            CompletionError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(CompletionError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

struct OpenAiCompletionClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let endpoint = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ]
        });

        let mut builder = self.http.post(&endpoint).json(&payload);
        if let Some(key) = self.api_key.as_deref() {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|error| {
            CompletionError::ProviderUnavailable(format!(
                "failed to reach {}: {error}",
                self.base_url
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::GenerationFailed(format!(
                "chat completions API returned {status}: {body}"
            )));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            CompletionError::InvalidResponse(format!(
                "failed to decode chat completion: {error}"
            ))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| CompletionError::InvalidResponse("response contained no choices".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "Answer from context.".into(),
            prompt: "Query: what?".into(),
        }
    }

    #[tokio::test]
    async fn ollama_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let client = OllamaCompletionClient {
            http: Client::new(),
            base_url: server.base_url(),
            model: "llama3.1".into(),
        };

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"model":"llama3.1","stream":false}"#);
                then.status(200).json_body(json!({
                    "response": "  It parses things.\n",
                    "done": true
                }));
            })
            .await;

        let answer = client.complete(request()).await.expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "It parses things.");
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        let client = OllamaCompletionClient {
            http: Client::new(),
            base_url: server.base_url(),
            model: "llama3.1".into(),
        };

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let error = client.complete(request()).await.expect_err("error response");
        assert!(
            matches!(error, CompletionError::GenerationFailed(ref message) if message.contains("500"))
        );
    }

    #[tokio::test]
    async fn openai_client_returns_first_choice() {
        let server = MockServer::start_async().await;
        let client = OpenAiCompletionClient {
            http: Client::new(),
            base_url: server.base_url(),
            api_key: Some("sk-test".into()),
            model: "gpt-4o-mini".into(),
        };

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test");
                then.status(200).json_body(json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "Answer." } }
                    ]
                }));
            })
            .await;

        let answer = client.complete(request()).await.expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "Answer.");
    }
}
