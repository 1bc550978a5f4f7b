//! Chunk-size heuristics and semantic chunking of repository files.
//!
//! - Sizing: an explicit `TEXT_SPLITTER_CHUNK_SIZE` wins; otherwise the budget is a quarter of
//!   the embedding model's context window, clamped to `[256, 1024]` tokens.
//! - Overlap: `TEXT_SPLITTER_CHUNK_OVERLAP` prepends the tail of the previous chunk so code
//!   spanning a boundary stays retrievable. Overlapped chunks still respect the budget.
//! - Token counting: `tiktoken-rs` when the model (or an encoding name) is known. Unknown
//!   Ollama models count whitespace-separated words; unknown OpenAI models use `cl100k_base`.

use crate::config::EmbeddingProvider;
use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, model::get_context_size, o200k_base, p50k_base,
    r50k_base,
};

use super::types::ChunkingError;

pub(crate) type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

const MIN_AUTOMATIC_CHUNK_SIZE: usize = 256;
const MAX_AUTOMATIC_CHUNK_SIZE: usize = 1024;

/// Splits documents into token-bounded chunks for one embedding model.
pub(crate) struct DocumentChunker {
    chunk_size: usize,
    overlap: usize,
    counter: TokenCounter,
}

impl DocumentChunker {
    /// Prepare a chunker for the given model, resolving the tokenizer once.
    pub(crate) fn new(
        override_size: Option<usize>,
        overlap: usize,
        provider: EmbeddingProvider,
        model: &str,
    ) -> Result<Self, ChunkingError> {
        let chunk_size = determine_chunk_size(override_size, provider, model);
        let counter = build_token_counter(provider, model)?;
        tracing::debug!(chunk_size, overlap, ?provider, model, "Document chunker ready");
        Ok(Self::with_counter(chunk_size, overlap, counter))
    }

    pub(crate) fn with_counter(chunk_size: usize, overlap: usize, counter: TokenCounter) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap,
            counter,
        }
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `text` into chunks no larger than the token budget; blank input yields nothing.
    pub(crate) fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let counter = self.counter.clone();
        let chunker = Chunker::new(
            self.chunk_size,
            Box::new(move |segment: &str| counter.as_ref()(segment)),
        );
        let chunks = chunker.chunk(text);
        self.apply_overlap(chunks)
    }

    fn count(&self, text: &str) -> usize {
        self.counter.as_ref()(text)
    }

    fn apply_overlap(&self, chunks: Vec<String>) -> Vec<String> {
        let overlap = self.overlap.min(self.chunk_size.saturating_sub(1));
        if overlap == 0 || chunks.len() < 2 {
            return chunks;
        }

        let mut overlapped = Vec::with_capacity(chunks.len());
        let mut previous: Option<String> = None;
        for current in chunks {
            let merged = match previous.as_deref() {
                Some(prev) => {
                    let tail = self.suffix_within(prev, overlap);
                    let mut combined = String::with_capacity(tail.len() + current.len() + 1);
                    combined.push_str(tail);
                    let needs_space = !tail.is_empty()
                        && !tail.ends_with(char::is_whitespace)
                        && !current.starts_with(char::is_whitespace);
                    if needs_space {
                        combined.push(' ');
                    }
                    combined.push_str(&current);
                    self.suffix_within(&combined, self.chunk_size).to_string()
                }
                None => current.clone(),
            };
            overlapped.push(merged);
            previous = Some(current);
        }
        overlapped
    }

    /// Longest left-trimmed suffix of `text` whose token count fits `budget`.
    fn suffix_within<'a>(&self, text: &'a str, budget: usize) -> &'a str {
        if budget == 0 {
            return "";
        }
        text.char_indices()
            .map(|(offset, _)| text[offset..].trim_start())
            .find(|candidate| self.count(candidate) <= budget)
            .unwrap_or("")
    }
}

/// Determine the chunk size, preferring an explicit override.
pub(crate) fn determine_chunk_size(
    override_size: Option<usize>,
    provider: EmbeddingProvider,
    model: &str,
) -> usize {
    if let Some(explicit) = override_size {
        return explicit.max(1);
    }

    let window = embedding_context_window(provider, model);
    (window / 4).clamp(MIN_AUTOMATIC_CHUNK_SIZE, MAX_AUTOMATIC_CHUNK_SIZE)
}

fn embedding_context_window(provider: EmbeddingProvider, model: &str) -> usize {
    match provider {
        EmbeddingProvider::OpenAI if model.starts_with("text-embedding-") => 8192,
        EmbeddingProvider::OpenAI => get_context_size(model),
        EmbeddingProvider::Ollama => {
            let normalized = model.to_lowercase();
            let base = normalized.split(':').next().unwrap_or_default();
            match base {
                "nomic-embed-text" | "mxbai-embed-large" | "mxbai-embed-large-v1" => 8192,
                value if value.contains("all-minilm") => 512,
                value if value.contains("e5-large") => 4096,
                _ => {
                    tracing::trace!(model, "Using default Ollama context window estimate");
                    4096
                }
            }
        }
    }
}

fn build_token_counter(
    provider: EmbeddingProvider,
    model: &str,
) -> Result<TokenCounter, ChunkingError> {
    let target = match model.trim() {
        "" => "cl100k_base",
        trimmed => trimmed,
    };
    let tokenizer_error = |source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    };

    let encoding = match (provider, resolve_encoding(target).map_err(tokenizer_error)?) {
        (_, Some(encoding)) => encoding,
        (EmbeddingProvider::Ollama, None) => {
            tracing::warn!(
                model = target,
                "No tokenizer for Ollama model; falling back to whitespace counter"
            );
            return Ok(whitespace_counter());
        }
        (EmbeddingProvider::OpenAI, None) => {
            tracing::debug!(model = target, "Unknown tokenizer model; using 'cl100k_base'");
            cl100k_base().map_err(tokenizer_error)?
        }
    };
    Ok(tiktoken_counter(encoding))
}

fn tiktoken_counter(encoding: CoreBPE) -> TokenCounter {
    let encoding = Arc::new(encoding);
    Arc::new(move |segment: &str| encoding.encode_ordinary(segment).len())
}

/// Encoding for a known model or encoding name; `None` when tiktoken has no mapping.
fn resolve_encoding(model: &str) -> Result<Option<CoreBPE>, TokenizerError> {
    if let Ok(encoding) = get_bpe_from_model(model) {
        return Ok(Some(encoding));
    }
    let encoding = match model {
        "cl100k_base" => cl100k_base()?,
        "o200k_base" => o200k_base()?,
        "p50k_base" => p50k_base()?,
        "r50k_base" | "gpt2" => r50k_base()?,
        _ => return Ok(None),
    };
    Ok(Some(encoding))
}

pub(crate) fn whitespace_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}
