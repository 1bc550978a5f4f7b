//! Answer prompt assembly.

use crate::llm::CompletionRequest;
use crate::qdrant::ScoredPoint;
use serde_json::Value;
use std::fmt::Write;

const SYSTEM_PROMPT: &str = "You answer questions about a software repository. \
Use only the provided context. If the context does not contain the answer, \
say that you don't know instead of guessing. Reference file paths when helpful.";

/// A retrieved chunk with the file it came from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ContextSnippet {
    pub(crate) path: Option<String>,
    pub(crate) text: String,
}

/// Extract usable snippets from search hits, skipping hits without text.
pub(crate) fn snippets_from_hits(hits: Vec<ScoredPoint>) -> Vec<ContextSnippet> {
    hits.into_iter()
        .filter_map(|hit| {
            let mut payload = hit.payload?;
            let text = match payload.remove("text") {
                Some(Value::String(text)) if !text.trim().is_empty() => text,
                _ => return None,
            };
            let path = match payload.remove("path") {
                Some(Value::String(path)) => Some(path),
                _ => None,
            };
            Some(ContextSnippet { path, text })
        })
        .collect()
}

pub(crate) fn build_answer_request(question: &str, snippets: &[ContextSnippet]) -> CompletionRequest {
    let mut prompt = String::from("Context:\n\n");
    if snippets.is_empty() {
        prompt.push_str("(no indexed content matched this question)\n\n");
    }
    for snippet in snippets {
        let label = snippet.path.as_deref().unwrap_or("unknown file");
        let _ = write!(prompt, "--- {label} ---\n{}\n\n", snippet.text.trim_end());
    }
    let _ = write!(prompt, "Query: {}\n\nHelpful Answer:", question.trim());

    CompletionRequest {
        system: SYSTEM_PROMPT.to_string(),
        prompt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn hit(payload: Value) -> ScoredPoint {
        ScoredPoint {
            id: "1".into(),
            score: 0.9,
            payload: match payload {
                Value::Object(map) => Some(map),
                _ => None,
            },
        }
    }

    #[test]
    fn snippets_skip_hits_without_text() {
        let snippets = snippets_from_hits(vec![
            hit(json!({ "text": "fn main() {}", "path": "src/main.rs" })),
            hit(json!({ "path": "empty.rs" })),
            hit(json!({ "text": "   " })),
            ScoredPoint {
                id: "2".into(),
                score: 0.1,
                payload: None,
            },
            hit(Value::Object(Map::from_iter([(
                "text".to_string(),
                Value::String("orphan".into()),
            )]))),
        ]);
        assert_eq!(
            snippets,
            vec![
                ContextSnippet {
                    path: Some("src/main.rs".into()),
                    text: "fn main() {}".into(),
                },
                ContextSnippet {
                    path: None,
                    text: "orphan".into(),
                },
            ]
        );
    }

    #[test]
    fn prompt_labels_snippets_and_ends_with_question() {
        let request = build_answer_request(
            " What does main do? ",
            &[ContextSnippet {
                path: Some("src/main.rs".into()),
                text: "fn main() {}\n".into(),
            }],
        );
        assert!(request.prompt.contains("--- src/main.rs ---\nfn main() {}\n"));
        assert!(request.prompt.ends_with("Query: What does main do?\n\nHelpful Answer:"));
        assert!(request.system.contains("don't know"));
    }

    #[test]
    fn prompt_notes_missing_context() {
        let request = build_answer_request("anything?", &[]);
        assert!(request.prompt.contains("no indexed content matched"));
    }
}
