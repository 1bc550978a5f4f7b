//! Filter helpers for Qdrant search and delete requests.

use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Compose a `must` filter requiring every key to match its value exactly.
///
/// Blank keys or values are ignored; returns `None` when nothing remains.
pub fn build_match_filter(conditions: &BTreeMap<String, String>) -> Option<Value> {
    let must: Vec<Value> = conditions
        .iter()
        .filter_map(|(key, value)| {
            let key = non_empty(key)?;
            let value = non_empty(value)?;
            Some(json!({
                "key": key,
                "match": { "value": value }
            }))
        })
        .collect();

    if must.is_empty() {
        None
    } else {
        Some(json!({ "must": must }))
    }
}

fn non_empty(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_exact_match_conditions() {
        let filter = build_match_filter(&BTreeMap::from([(
            "github_repo".to_string(),
            "foo/bar".to_string(),
        )]))
        .expect("filter");
        assert_eq!(
            filter,
            json!({
                "must": [
                    { "key": "github_repo", "match": { "value": "foo/bar" } }
                ]
            })
        );
    }

    #[test]
    fn blank_conditions_produce_no_filter() {
        assert!(build_match_filter(&BTreeMap::new()).is_none());
        assert!(
            build_match_filter(&BTreeMap::from([("github_repo".to_string(), " ".to_string())]))
                .is_none()
        );
    }
}
