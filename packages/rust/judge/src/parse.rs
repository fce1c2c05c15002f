//! Tolerant parsing of judge responses.
//!
//! Models are asked for `{"clusters": [{"canonical_name", "description",
//! "members": [1, 2]}]}` where members are the 1-based handles of the batch.
//! In practice responses arrive fenced in Markdown, as a bare array, with
//! member names instead of handles, or with raw concept IDs. All of these
//! are accepted; anything that still cannot be mapped to a batch member is
//! passed through verbatim so the caller can count and drop it.

use std::sync::LazyLock;

use curricula_shared::ConceptId;
use regex::Regex;
use serde_json::Value;

use crate::{ConceptRecord, JudgeError, ProposedCluster};

/// Parse a raw model response into clusters over `batch`.
pub fn parse_clusters(
    text: &str,
    batch: &[ConceptRecord],
) -> Result<Vec<ProposedCluster>, JudgeError> {
    let value = extract_json(text)?;

    let clusters = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("clusters") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(JudgeError::Unparseable(
                    "response object has no `clusters` array".into(),
                ));
            }
        },
        _ => {
            return Err(JudgeError::Unparseable(
                "response is neither an array nor an object".into(),
            ));
        }
    };

    let mut out = Vec::with_capacity(clusters.len());
    for item in clusters {
        let Value::Object(obj) = item else {
            return Err(JudgeError::Unparseable(format!(
                "cluster entry is not an object: {item}"
            )));
        };

        let canonical_name = first_str(obj, &["canonical_name", "name", "canonical"])
            .unwrap_or_default()
            .to_string();
        let description = first_str(obj, &["description", "definition"])
            .unwrap_or_default()
            .to_string();

        let members = ["members", "member_ids", "source_concepts", "concepts"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_array))
            .ok_or_else(|| {
                JudgeError::Unparseable(format!("cluster '{canonical_name}' has no member list"))
            })?;

        let member_ids = members
            .iter()
            .filter_map(|m| resolve_member(m, batch))
            .collect();

        out.push(ProposedCluster {
            canonical_name,
            description,
            member_ids,
        });
    }

    Ok(out)
}

/// Pull the JSON document out of a model response.
fn extract_json(text: &str) -> Result<Value, JudgeError> {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("valid regex")
    });

    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Ok(v);
    }

    if let Some(caps) = FENCE_RE.captures(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(caps[1].trim()) {
            return Ok(v);
        }
    }

    // Last resort: the widest {...} or [...] span.
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                    return Ok(v);
                }
            }
        }
    }

    let preview: String = trimmed.chars().take(200).collect();
    Err(JudgeError::Unparseable(format!("no JSON document found (got: {preview})")))
}

fn first_str<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str))
}

/// Map one member reference to a concept ID.
///
/// Order: 1-based handle, exact concept ID, unique case-insensitive name.
/// Unmatched strings are returned as-is; non-string, non-number values are dropped.
fn resolve_member(member: &Value, batch: &[ConceptRecord]) -> Option<ConceptId> {
    let raw = match member {
        Value::Number(n) => {
            return match n.as_u64().and_then(|h| handle_to_id(h, batch)) {
                Some(id) => Some(id),
                None => Some(ConceptId(n.to_string())),
            };
        }
        Value::String(s) => s.trim(),
        _ => return None,
    };

    if let Ok(h) = raw.parse::<u64>() {
        if let Some(id) = handle_to_id(h, batch) {
            return Some(id);
        }
    }

    if let Some(rec) = batch.iter().find(|r| r.id.as_str() == raw) {
        return Some(rec.id.clone());
    }

    let mut by_name = batch.iter().filter(|r| r.name.eq_ignore_ascii_case(raw));
    if let (Some(rec), None) = (by_name.next(), by_name.next()) {
        return Some(rec.id.clone());
    }

    Some(ConceptId(raw.to_string()))
}

fn handle_to_id(handle: u64, batch: &[ConceptRecord]) -> Option<ConceptId> {
    let idx = usize::try_from(handle).ok()?.checked_sub(1)?;
    batch.get(idx).map(|r| r.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> Vec<ConceptRecord> {
        ["E-Stop", "Emergency Stop", "Emergency Halt", "LOTO"]
            .iter()
            .enumerate()
            .map(|(i, name)| ConceptRecord {
                id: ConceptId(format!("id-{i}")),
                name: (*name).into(),
                description: String::new(),
            })
            .collect()
    }

    fn ids(cluster: &ProposedCluster) -> Vec<&str> {
        cluster.member_ids.iter().map(ConceptId::as_str).collect()
    }

    #[test]
    fn parses_handles_in_clusters_object() {
        let text = r#"{"clusters":[{"canonical_name":"Emergency Stop","description":"halt","members":[1,2,3]}]}"#;
        let clusters = parse_clusters(text, &batch()).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].canonical_name, "Emergency Stop");
        assert_eq!(clusters[0].description, "halt");
        assert_eq!(ids(&clusters[0]), vec!["id-0", "id-1", "id-2"]);
    }

    #[test]
    fn parses_fenced_bare_array() {
        let text = "Here you go:\n```json\n[{\"name\": \"Emergency Stop\", \"members\": [\"1\", \"3\"]}]\n```\nDone.";
        let clusters = parse_clusters(text, &batch()).unwrap();
        assert_eq!(ids(&clusters[0]), vec!["id-0", "id-2"]);
        assert_eq!(clusters[0].description, "");
    }

    #[test]
    fn resolves_names_and_raw_ids() {
        let text = r#"{"clusters":[{"canonical_name":"Emergency Stop","source_concepts":["e-stop","id-2","Mystery"]}]}"#;
        let clusters = parse_clusters(text, &batch()).unwrap();
        assert_eq!(ids(&clusters[0]), vec!["id-0", "id-2", "Mystery"]);
    }

    #[test]
    fn out_of_range_handle_passes_through() {
        let text = r#"{"clusters":[{"canonical_name":"X","members":[1, 99, 0]}]}"#;
        let clusters = parse_clusters(text, &batch()).unwrap();
        assert_eq!(ids(&clusters[0]), vec!["id-0", "99", "0"]);
    }

    #[test]
    fn prose_only_is_unparseable() {
        let err = parse_clusters("I think these are all different.", &batch()).unwrap_err();
        assert!(matches!(err, JudgeError::Unparseable(_)));
    }

    #[test]
    fn missing_member_list_is_unparseable() {
        let err = parse_clusters(r#"{"clusters":[{"canonical_name":"X"}]}"#, &batch()).unwrap_err();
        assert!(err.to_string().contains("member list"));
    }

    #[test]
    fn empty_cluster_list_is_valid() {
        assert!(parse_clusters(r#"{"clusters": []}"#, &batch()).unwrap().is_empty());
    }
}
