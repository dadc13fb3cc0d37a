use crate::step::StepKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// One redacted value as reported by the engine. Read-only on this side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMapEntry {
    /// Display token, e.g. `EMAIL_1`.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub original: String,
    #[serde(default)]
    pub occurrences: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// The engine's record of everything it redacted in one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMap {
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub canonical: HashMap<String, CanonicalMapEntry>,
}

impl CanonicalMap {
    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}

/// Sum of occurrences across every entry.
pub fn total_redactions(map: &CanonicalMap) -> u64 {
    map.canonical
        .values()
        .fold(0u64, |total, e| total.saturating_add(e.occurrences))
}

/// Sum of occurrences for entries of one type. Engine aliases count as
/// their canonical kind (`api_key` matches `apikey`).
pub fn match_count(map: &CanonicalMap, kind: &str) -> u64 {
    let kind = StepKind::from_tag(kind);
    map.canonical
        .values()
        .filter(|e| StepKind::from_tag(&e.kind) == kind)
        .fold(0u64, |total, e| total.saturating_add(e.occurrences))
}

/// Per-type occurrence sums, ordered by type name.
pub fn counts_by_type(map: &CanonicalMap) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for entry in map.canonical.values() {
        let count = counts.entry(entry.kind.clone()).or_insert(0u64);
        *count = count.saturating_add(entry.occurrences);
    }
    counts
}

/// Resolve a display token to its entry. Accepts `EMAIL_1` or `<EMAIL_1>`.
pub fn entry_for_token<'a>(map: &'a CanonicalMap, token: &str) -> Option<&'a CanonicalMapEntry> {
    let id = token
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .unwrap_or(token);
    map.canonical.values().find(|e| e.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> CanonicalMap {
        serde_json::from_value(json!({
            "meta": {},
            "canonical": {
                "f1": {"id": "EMAIL_1", "type": "email", "original": "a@x.io", "occurrences": 3},
                "f2": {"id": "EMAIL_2", "type": "email", "original": "b@x.io", "occurrences": 1,
                       "context_before": "to: ", "context_after": " cc"},
                "f3": {"id": "UUID_1", "type": "uuid", "original": "123e4567", "occurrences": 2,
                       "method": "regex"}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_total_redactions() {
        assert_eq!(total_redactions(&sample()), 6);
        assert_eq!(total_redactions(&CanonicalMap::default()), 0);
    }

    #[test]
    fn test_match_count_by_type() {
        let map = sample();
        assert_eq!(match_count(&map, "email"), 4);
        assert_eq!(match_count(&map, "uuid"), 2);
        assert_eq!(match_count(&map, "ipv4"), 0);
    }

    #[test]
    fn test_match_count_folds_engine_aliases() {
        let map: CanonicalMap = serde_json::from_value(json!({
            "canonical": {
                "k": {"id": "API_KEY_1", "type": "api_key", "original": "sk-1", "occurrences": 2}
            }
        }))
        .unwrap();
        assert_eq!(match_count(&map, "apikey"), 2);
    }

    #[test]
    fn test_counts_by_type_agree_with_total() {
        let map = sample();
        let counts = counts_by_type(&map);
        assert_eq!(counts.values().sum::<u64>(), total_redactions(&map));
        assert_eq!(counts.keys().collect::<Vec<_>>(), vec!["email", "uuid"]);
    }

    #[test]
    fn test_huge_occurrence_counts_saturate() {
        let map: CanonicalMap = serde_json::from_value(json!({
            "canonical": {
                "a": {"id": "EMAIL_1", "type": "email", "original": "a", "occurrences": u64::MAX},
                "b": {"id": "EMAIL_2", "type": "email", "original": "b", "occurrences": 7}
            }
        }))
        .unwrap();
        assert_eq!(total_redactions(&map), u64::MAX);
        assert_eq!(match_count(&map, "email"), u64::MAX);
        assert_eq!(counts_by_type(&map)["email"], u64::MAX);
    }

    #[test]
    fn test_entry_for_token() {
        let map = sample();
        assert_eq!(entry_for_token(&map, "<UUID_1>").map(|e| e.original.as_str()), Some("123e4567"));
        assert_eq!(entry_for_token(&map, "EMAIL_2").and_then(|e| e.context_before.as_deref()), Some("to: "));
        assert!(entry_for_token(&map, "EMAIL_9").is_none());
    }

    #[test]
    fn test_missing_sections_default() {
        let map: CanonicalMap = serde_json::from_value(json!({})).unwrap();
        assert!(map.is_empty());
    }
}
