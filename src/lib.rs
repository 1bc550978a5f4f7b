#![deny(missing_docs)]

//! Core library for the repo-chat server: register GitHub repositories and ask questions
//! about their contents.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// GitHub repository content loader.
pub mod github;
/// Answer-synthesis completion clients.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Qdrant vector store integration.
pub mod qdrant;
/// Retrieval-augmented ingestion and question answering.
pub mod rag;
/// Durable registry of added repositories.
pub mod registry;
/// Canonical repository identifiers.
pub mod repo_id;
