//! Retrieval service coordinating loading, chunking, embedding, storage, and answering.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, get_embedding_client},
    github::{GithubLoader, GithubLoaderSettings, RepoDocument},
    llm::{CompletionClient, get_completion_client},
    qdrant::{PointInsert, PointTags, QdrantService, build_match_filter, compute_chunk_hash},
    rag::{
        chunking::DocumentChunker,
        prompt::{build_answer_request, snippets_from_hits},
        types::{ContentKind, IngestOutcome, IngestRequest, REPO_TAG, RagError, ScopeFilter},
    },
};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;

const INDEX_BATCH_SIZE: usize = 128;

/// Abstraction over the retrieval pipeline used by the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Load, chunk, embed, and store the content described by `request`.
    async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, RagError>;

    /// Answer `question` using only content matching `scope`.
    async fn answer(&self, question: &str, scope: &ScopeFilter) -> Result<String, RagError>;
}

/// Owns long-lived handles to every collaborator of the pipeline.
///
/// Construct once near process start and share it through an `Arc`.
pub struct RagService {
    loader: GithubLoader,
    embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
    completion_client: Box<dyn CompletionClient>,
    store: QdrantService,
    chunker: DocumentChunker,
    collection: String,
    dimension: usize,
    top_k: usize,
}

#[derive(Debug)]
struct PreparedChunk {
    path: String,
    text: String,
    chunk_hash: String,
}

impl RagService {
    /// Build the service and make sure the vector collection is ready.
    pub async fn new(config: &Config) -> Result<Self, RagError> {
        let http = Client::builder().user_agent("repo-chat/0.1").build()?;

        let loader = GithubLoader::new(GithubLoaderSettings {
            api_url: config.github_api_url.clone(),
            token: config.github_token.clone(),
            max_files: config.github_max_files,
            max_file_bytes: config.github_max_file_bytes,
        })?;
        let chunker = DocumentChunker::new(
            config.text_splitter_chunk_size,
            config.text_splitter_chunk_overlap,
            config.embedding_provider,
            &config.embedding_model,
        )?;
        tracing::info!("Initializing embedding and completion clients");
        let embedding_client = get_embedding_client(config, http.clone());
        let completion_client = get_completion_client(config, http);

        let store = QdrantService::new(&config.qdrant_url, config.qdrant_api_key.clone())?;
        let collection = config.qdrant_collection_name.clone();
        tracing::debug!(
            collection = %collection,
            vector_size = config.embedding_dimension,
            "Ensuring primary collection"
        );
        store
            .create_collection_if_not_exists(&collection, config.embedding_dimension as u64)
            .await?;
        store.ensure_payload_indexes(&collection, &[REPO_TAG]).await?;
        tracing::info!(
            collection = %collection,
            chunk_size = chunker.chunk_size(),
            "Retrieval service ready"
        );

        Ok(Self {
            loader,
            embedding_client,
            completion_client,
            store,
            chunker,
            collection,
            dimension: config.embedding_dimension,
            top_k: config.retrieval_top_k.max(1),
        })
    }

    fn prepare_chunks(&self, documents: &[RepoDocument]) -> (Vec<PreparedChunk>, usize) {
        let mut seen = HashSet::new();
        let mut skipped = 0;
        let mut prepared = Vec::new();
        for document in documents {
            for text in self.chunker.split(&document.content) {
                let chunk_hash = compute_chunk_hash(&text);
                if !seen.insert(chunk_hash.clone()) {
                    skipped += 1;
                    continue;
                }
                prepared.push(PreparedChunk {
                    path: document.path.clone(),
                    text,
                    chunk_hash,
                });
            }
        }
        (prepared, skipped)
    }

    fn validate_vectors(&self, expected: usize, vectors: &[Vec<f32>]) -> Result<(), RagError> {
        if vectors.len() != expected {
            return Err(RagError::EmbeddingCountMismatch {
                expected,
                actual: vectors.len(),
            });
        }
        match vectors.iter().find(|vector| vector.len() != self.dimension) {
            Some(vector) => Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, RagError> {
        let IngestRequest {
            source,
            kind,
            repo,
            tags,
        } = request;
        tracing::info!(source = %source, kind = %kind, "Ingesting content");

        let documents = match kind {
            ContentKind::GithubRepo => self.loader.load(&repo).await?,
        };
        let (prepared, skipped_duplicates) = self.prepare_chunks(&documents);

        if let Some(filter) = build_match_filter(&tags) {
            self.store.delete_points(&self.collection, filter).await?;
        }

        let point_tags = PointTags {
            data_type: kind.as_str().to_string(),
            tags,
        };
        let mut chunks = 0;
        let mut pending = prepared.into_iter().peekable();
        while pending.peek().is_some() {
            let batch: Vec<PreparedChunk> = pending.by_ref().take(INDEX_BATCH_SIZE).collect();
            let texts = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.embedding_client.generate_embeddings(texts).await?;
            self.validate_vectors(batch.len(), &vectors)?;

            let points = batch
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| PointInsert {
                    text: chunk.text,
                    path: chunk.path,
                    chunk_hash: chunk.chunk_hash,
                    vector,
                })
                .collect();
            chunks += self
                .store
                .index_points(&self.collection, points, &point_tags)
                .await?;
        }

        let outcome = IngestOutcome {
            documents: documents.len(),
            chunks,
            skipped_duplicates,
        };
        tracing::info!(
            source = %source,
            documents = outcome.documents,
            chunks = outcome.chunks,
            skipped_duplicates = outcome.skipped_duplicates,
            "Content ingested"
        );
        Ok(outcome)
    }

    async fn answer(&self, question: &str, scope: &ScopeFilter) -> Result<String, RagError> {
        let mut vectors = self
            .embedding_client
            .generate_embeddings(vec![question.to_string()])
            .await?;
        let vector = vectors.pop().ok_or(RagError::EmptyEmbedding)?;
        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let hits = self
            .store
            .search_points(
                &self.collection,
                vector,
                build_match_filter(scope.conditions()),
                self.top_k,
            )
            .await?;
        let snippets = snippets_from_hits(hits);
        tracing::debug!(snippets = snippets.len(), scope = ?scope.conditions(), "Retrieved context");

        let answer = self
            .completion_client
            .complete(build_answer_request(question, &snippets))
            .await?;
        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        embedding::EmbeddingClientError,
        llm::{CompletionError, CompletionRequest},
        rag::chunking::whitespace_counter,
        repo_id::RepoId,
    };
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    const DIMENSION: usize = 3;

    struct FixedEmbeddings {
        dimension: usize,
        drop_one: bool,
    }

    #[async_trait]
    impl EmbeddingClient for FixedEmbeddings {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            let count = if self.drop_one {
                texts.len().saturating_sub(1)
            } else {
                texts.len()
            };
            Ok(vec![vec![0.5; self.dimension]; count])
        }
    }

    #[derive(Clone, Default)]
    struct RecordingCompletion {
        requests: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    #[async_trait]
    impl CompletionClient for RecordingCompletion {
        async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
            self.requests.lock().expect("lock").push(request);
            Ok("  It prints a greeting.\n".into())
        }
    }

    fn service(
        server: &MockServer,
        embeddings: FixedEmbeddings,
        completion: RecordingCompletion,
    ) -> RagService {
        RagService {
            loader: GithubLoader::new(GithubLoaderSettings {
                api_url: server.url("/github"),
                token: None,
                max_files: 10,
                max_file_bytes: 10_000,
            })
            .expect("loader"),
            embedding_client: Box::new(embeddings),
            completion_client: Box::new(completion),
            store: QdrantService::new(&server.url("/qdrant"), None).expect("store"),
            chunker: DocumentChunker::with_counter(64, 0, whitespace_counter()),
            collection: "repo-chat".into(),
            dimension: DIMENSION,
            top_k: 2,
        }
    }

    fn repo() -> RepoId {
        RepoId::parse("foo/bar").expect("valid")
    }

    async fn mock_repository(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/github/repos/foo/bar");
                then.status(200).json_body(json!({ "default_branch": "main" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/github/repos/foo/bar/git/trees/main");
                then.status(200).json_body(json!({
                    "tree": [
                        { "path": "a.rs", "type": "blob", "size": 30 },
                        { "path": "b.rs", "type": "blob", "size": 30 }
                    ]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/github/repos/foo/bar/contents/a.rs");
                then.status(200).body("fn main() { hello(); }");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/github/repos/foo/bar/contents/b.rs");
                then.status(200).body("fn main() { hello(); }");
            })
            .await;
    }

    #[tokio::test]
    async fn ingest_replaces_tagged_points_and_skips_duplicate_chunks() {
        let server = MockServer::start_async().await;
        mock_repository(&server).await;
        let delete_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/qdrant/collections/repo-chat/points/delete")
                    .json_body(json!({
                        "filter": {
                            "must": [
                                { "key": "github_repo", "match": { "value": "foo/bar" } }
                            ]
                        }
                    }));
                then.status(200).json_body(json!({ "status": "ok" }));
            })
            .await;
        let upsert_mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/qdrant/collections/repo-chat/points")
                    .body_contains("\"github_repo\":\"foo/bar\"")
                    .body_contains("\"data_type\":\"github\"");
                then.status(200).json_body(json!({ "status": "ok" }));
            })
            .await;

        let rag = service(
            &server,
            FixedEmbeddings {
                dimension: DIMENSION,
                drop_one: false,
            },
            RecordingCompletion::default(),
        );
        let outcome = rag
            .ingest(IngestRequest::github_repo(&repo()))
            .await
            .expect("ingest");

        delete_mock.assert_async().await;
        upsert_mock.assert_async().await;
        assert_eq!(outcome.documents, 2);
        assert_eq!(outcome.skipped_duplicates, 1);
        assert_eq!(outcome.chunks, 1);
    }

    #[tokio::test]
    async fn ingest_rejects_wrong_vector_count() {
        let server = MockServer::start_async().await;
        mock_repository(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/qdrant/collections/repo-chat/points/delete");
                then.status(200).json_body(json!({ "status": "ok" }));
            })
            .await;

        let rag = service(
            &server,
            FixedEmbeddings {
                dimension: DIMENSION,
                drop_one: true,
            },
            RecordingCompletion::default(),
        );
        let error = rag
            .ingest(IngestRequest::github_repo(&repo()))
            .await
            .expect_err("count mismatch");
        assert!(matches!(
            error,
            RagError::EmbeddingCountMismatch {
                expected: 1,
                actual: 0
            }
        ));
    }

    #[tokio::test]
    async fn ingest_propagates_loader_failures_without_touching_store() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/github/repos/foo/bar");
                then.status(404);
            })
            .await;
        let delete_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/qdrant/collections/repo-chat/points/delete");
                then.status(200);
            })
            .await;

        let rag = service(
            &server,
            FixedEmbeddings {
                dimension: DIMENSION,
                drop_one: false,
            },
            RecordingCompletion::default(),
        );
        let error = rag
            .ingest(IngestRequest::github_repo(&repo()))
            .await
            .expect_err("missing repo");
        assert!(matches!(error, RagError::Loader(_)));
        delete_mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn answer_searches_within_scope_and_trims_completion() {
        let server = MockServer::start_async().await;
        let search_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/qdrant/collections/repo-chat/points/query")
                    .json_body_partial(
                        json!({
                            "limit": 2,
                            "filter": {
                                "must": [
                                    { "key": "github_repo", "match": { "value": "foo/bar" } }
                                ]
                            }
                        })
                        .to_string(),
                    );
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            {
                                "id": "p1",
                                "score": 0.8,
                                "payload": { "text": "fn main() { hello(); }", "path": "a.rs" }
                            }
                        ]
                    }
                }));
            })
            .await;

        let completion = RecordingCompletion::default();
        let rag = service(
            &server,
            FixedEmbeddings {
                dimension: DIMENSION,
                drop_one: false,
            },
            completion.clone(),
        );
        let answer = rag
            .answer("What does main do?", &ScopeFilter::repo(&repo()))
            .await
            .expect("answer");

        search_mock.assert_async().await;
        assert_eq!(answer, "It prints a greeting.");
        let requests = completion.requests.lock().expect("lock");
        assert_eq!(requests.len(), 1);
        assert!(requests[0].prompt.contains("--- a.rs ---"));
        assert!(requests[0].prompt.contains("What does main do?"));
    }

    #[tokio::test]
    async fn answer_rejects_dimension_mismatch() {
        let server = MockServer::start_async().await;
        let rag = service(
            &server,
            FixedEmbeddings {
                dimension: DIMENSION + 1,
                drop_one: false,
            },
            RecordingCompletion::default(),
        );
        let error = rag
            .answer("anything", &ScopeFilter::repo(&repo()))
            .await
            .expect_err("dimension mismatch");
        assert!(matches!(
            error,
            RagError::DimensionMismatch {
                expected: 3,
                actual: 4
            }
        ));
    }

    #[tokio::test]
    async fn answer_reports_empty_embedding() {
        let server = MockServer::start_async().await;
        let rag = service(
            &server,
            FixedEmbeddings {
                dimension: DIMENSION,
                drop_one: true,
            },
            RecordingCompletion::default(),
        );
        let error = rag
            .answer("anything", &ScopeFilter::repo(&repo()))
            .await
            .expect_err("no vector");
        assert!(matches!(error, RagError::EmptyEmbedding));
    }
}
