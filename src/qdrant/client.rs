//! HTTP client wrapper for interacting with Qdrant.

use crate::qdrant::{
    payload::{build_payload, chunk_point_id, current_timestamp_rfc3339},
    types::{PointInsert, PointTags, QdrantError, QueryResponse, QueryResponseResult, ScoredPoint},
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a client for the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("repo-chat/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Create a collection only when it is missing from Qdrant.
    pub async fn create_collection_if_not_exists(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        if self.collection_exists(collection_name).await? {
            return Ok(());
        }

        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });
        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::info!(collection = collection_name, vector_size, "Collection created");
        })
        .await
    }

    /// Ensure keyword payload indexes exist for the given fields.
    ///
    /// Failures are logged and tolerated; a missing index only slows filtered search.
    pub async fn ensure_payload_indexes(
        &self,
        collection_name: &str,
        fields: &[&str],
    ) -> Result<(), QdrantError> {
        for field in fields {
            let body = json!({
                "field_name": field,
                "field_schema": "keyword",
            });

            let response = self
                .request(Method::PUT, &format!("collections/{collection_name}/index"))
                .json(&body)
                .send()
                .await?;

            match response.status() {
                status if status.is_success() => {
                    tracing::debug!(collection = collection_name, field, "Payload index ensured");
                }
                StatusCode::CONFLICT => {
                    tracing::debug!(collection = collection_name, field, "Payload index already exists");
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    let error = QdrantError::UnexpectedStatus { status, body };
                    tracing::warn!(collection = collection_name, field, error = %error, "Failed to ensure payload index");
                }
            }
        }

        Ok(())
    }

    /// Upsert vectors, attaching `tags` to every payload. Returns the number of points written.
    ///
    /// Point ids derive from the tags, path, and chunk hash, so writing the same chunk twice
    /// replaces the earlier point.
    pub async fn index_points(
        &self,
        collection_name: &str,
        points: Vec<PointInsert>,
        tags: &PointTags,
    ) -> Result<usize, QdrantError> {
        if points.is_empty() {
            return Ok(0);
        }

        let now = current_timestamp_rfc3339();
        let serialized: Vec<Value> = points
            .into_iter()
            .map(|point| {
                json!({
                    "id": chunk_point_id(tags, &point.path, &point.chunk_hash),
                    "vector": point.vector,
                    "payload": build_payload(&point.text, &point.path, &point.chunk_hash, &now, tags),
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}/points"))
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, points = point_count, "Points indexed");
        })
        .await?;

        Ok(point_count)
    }

    /// Delete every point matching `filter`.
    pub async fn delete_points(
        &self,
        collection_name: &str,
        filter: Value,
    ) -> Result<(), QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/delete"),
            )
            .query(&[("wait", true)])
            .json(&json!({ "filter": filter }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Points deleted by filter");
        })
        .await
    }

    /// Perform a similarity search against a collection, returning scored payloads.
    pub async fn search_points(
        &self,
        collection_name: &str,
        vector: Vec<f32>,
        filter: Option<Value>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        let mut body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let (Some(filter_value), Some(obj)) = (filter, body.as_object_mut()) {
            obj.insert("filter".into(), filter_value);
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };

        Ok(points
            .into_iter()
            .map(|point| ScoredPoint {
                id: stringify_point_id(point.id),
                score: point.score,
                payload: point.payload,
            })
            .collect())
    }

    async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
