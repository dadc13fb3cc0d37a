//! Portable pipeline documents ("recipes").
//!
//! A recipe is plain UTF-8 JSON. Export writes `{version, name, steps}`;
//! import parses leniently, regenerates every step id, then validates each
//! step record on its own so one bad entry never sinks the whole file.

use crate::step::{Step, StepConfig, StepKind};
use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub const RECIPE_VERSION: u64 = 1;
pub const DEFAULT_RECIPE_NAME: &str = "Custom Pipeline";
pub const RECIPE_EXTENSION: &str = "json";

const ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

static ID_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("recipe is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid recipe structure: {0}")]
    Schema(String),
    #[error("unsupported recipe file extension: {0}")]
    UnsupportedExtension(String),
    #[error("recipe file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Saved pipeline. `S` is `Step` on export and raw JSON right after import,
/// before each entry has been validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecipe<S = Step> {
    pub version: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<S>,
}

impl PipelineRecipe<Step> {
    pub fn to_json(&self) -> Result<String, RecipeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl PipelineRecipe<Value> {
    /// Validate the raw step records, dropping malformed ones.
    pub fn into_steps(self) -> Vec<Step> {
        validate_entries(&self.steps)
    }
}

/// Opaque step id: millisecond timestamp, process-wide sequence, random suffix.
pub fn new_step_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let seq = ID_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{millis}-{seq}-{suffix}")
}

/// Give every step a fresh id.
pub fn regenerate_ids(steps: &mut [Step]) {
    for step in steps {
        step.id = new_step_id();
    }
}

pub fn serialize(steps: &[Step], name: &str) -> PipelineRecipe {
    PipelineRecipe {
        version: RECIPE_VERSION,
        name: name.to_string(),
        description: None,
        steps: steps
            .iter()
            .map(|s| Step {
                id: s.id.clone(),
                kind: s.kind.clone(),
                // Labels change the engine's token names, so they travel too.
                label: s.label.clone(),
                enabled: s.enabled,
                config: s.config.clone(),
            })
            .collect(),
    }
}

pub fn parse(text: &str) -> Result<PipelineRecipe<Value>, RecipeError> {
    let doc: Value = serde_json::from_str(text)?;
    let Value::Object(mut doc) = doc else {
        return Err(RecipeError::Schema("recipe must be a JSON object".to_string()));
    };

    // Any truthy version is accepted; non-integer ones read as the current.
    let version = match doc.get("version") {
        Some(v) if is_truthy(v) => v.as_u64().unwrap_or(RECIPE_VERSION),
        _ => return Err(RecipeError::Schema("missing recipe version".to_string())),
    };

    let Some(Value::Array(mut steps)) = doc.remove("steps") else {
        return Err(RecipeError::Schema("steps must be an array".to_string()));
    };

    for step in steps.iter_mut() {
        if let Value::Object(fields) = step {
            fields.insert("id".to_string(), Value::String(new_step_id()));
        }
    }

    let name = doc
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_RECIPE_NAME)
        .to_string();
    let description = doc
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    tracing::debug!(version, name = %name, entries = steps.len(), "parsed recipe");

    Ok(PipelineRecipe {
        version,
        name,
        description,
        steps,
    })
}

/// Accept a bare step array or an object with a `steps` array.
/// Returns `None` when the candidate is neither.
pub fn validate(candidate: &Value) -> Option<Vec<Step>> {
    let entries = match candidate {
        Value::Array(entries) => entries,
        Value::Object(fields) => fields.get("steps")?.as_array()?,
        _ => return None,
    };
    Some(validate_entries(entries))
}

/// Parse then validate in one go: the import path for recipe text.
pub fn import(text: &str) -> Result<Vec<Step>, RecipeError> {
    Ok(parse(text)?.into_steps())
}

fn validate_entries(entries: &[Value]) -> Vec<Step> {
    let steps: Vec<Step> = entries.iter().filter_map(validate_entry).collect();
    if steps.len() < entries.len() {
        tracing::warn!(
            dropped = entries.len() - steps.len(),
            kept = steps.len(),
            "dropped malformed recipe steps"
        );
    }
    steps
}

fn validate_entry(entry: &Value) -> Option<Step> {
    let fields = entry.as_object()?;

    let id = match fields.get("id")? {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let kind = match fields.get("type")? {
        Value::String(s) if !s.is_empty() => StepKind::from_tag(s),
        _ => return None,
    };

    let enabled = match fields.get("enabled") {
        None => true,
        Some(Value::Bool(b)) => *b,
        Some(other) => is_truthy(other),
    };
    let config: StepConfig = match fields.get("config") {
        Some(Value::Object(config)) => config.clone(),
        _ => Map::new(),
    };
    let label = fields.get("label").and_then(Value::as_str).map(str::to_string);

    Some(Step {
        id,
        kind,
        label,
        enabled,
        config,
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Bundled starter pipelines.
pub fn example_recipes() -> Vec<PipelineRecipe<Value>> {
    vec![
        PipelineRecipe {
            version: RECIPE_VERSION,
            name: "PII Scrubber".to_string(),
            description: Some("Removes common personal identifiers like emails and UUIDs.".to_string()),
            steps: vec![
                json!({"id": "ex_1", "type": "email", "enabled": true, "config": {}}),
                json!({"id": "ex_2", "type": "uuid", "enabled": true, "config": {}}),
            ],
        },
        PipelineRecipe {
            version: RECIPE_VERSION,
            name: "Infrastructure Logs".to_string(),
            description: Some("Cleans up IP addresses and MAC addresses from server logs.".to_string()),
            steps: vec![
                json!({"id": "ex_3", "type": "ipv4", "enabled": true, "config": {}}),
                json!({"id": "ex_4", "type": "mac", "enabled": true, "config": {}}),
            ],
        },
        PipelineRecipe {
            version: RECIPE_VERSION,
            name: "API Trace Cleaner".to_string(),
            description: Some("Redacts JWTs and UUIDs from API request/response traces.".to_string()),
            steps: vec![
                json!({"id": "ex_5", "type": "jwt", "enabled": true, "config": {"partial": true}}),
                json!({"id": "ex_6", "type": "uuid", "enabled": true, "config": {}}),
            ],
        },
    ]
}

/// Steps of a bundled example (case-insensitive name), with fresh ids.
pub fn load_example(name: &str) -> Option<Vec<Step>> {
    let recipe = example_recipes()
        .into_iter()
        .find(|r| r.name.eq_ignore_ascii_case(name))?;
    let mut steps = recipe.into_steps();
    regenerate_ids(&mut steps);
    Some(steps)
}

pub fn recipe_file_name(date: NaiveDate) -> String {
    format!("scrubchef_recipe_{}.json", date.format("%Y-%m-%d"))
}

/// Write the pipeline as a recipe file into `dir`. Returns the written path.
pub fn save_recipe(
    dir: &Path,
    steps: &[Step],
    name: &str,
    date: NaiveDate,
) -> Result<PathBuf, RecipeError> {
    let path = dir.join(recipe_file_name(date));
    let text = serialize(steps, name).to_json()?;
    std::fs::write(&path, text).map_err(|source| RecipeError::Io {
        path: path.clone(),
        source,
    })?;
    tracing::info!(path = %path.display(), steps = steps.len(), "recipe saved");
    Ok(path)
}

/// Read and import a recipe file. Only `.json` files are accepted.
pub fn load_recipe(path: &Path) -> Result<Vec<Step>, RecipeError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if !ext.eq_ignore_ascii_case(RECIPE_EXTENSION) {
        return Err(RecipeError::UnsupportedExtension(path.display().to_string()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| RecipeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    import(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample_steps() -> Vec<Step> {
        let mut email = Step::new("a", StepKind::Email);
        email.config.insert("allowedDomains".into(), json!("corp.com, x.io"));
        let mut uuid = Step::new("b", StepKind::Uuid);
        uuid.enabled = false;
        let mut header = Step::new("c", StepKind::Header);
        header.label = Some("Auth headers".to_string());
        header.config.insert("names".into(), json!(["Authorization"]));
        vec![email, uuid, header]
    }

    #[test]
    fn test_validate_bare_array() {
        let steps = validate(&json!([{"id": "a", "type": "email"}])).unwrap();
        assert_eq!(steps.len(), 1);
        assert!(steps[0].enabled);
        assert!(steps[0].config.is_empty());
    }

    #[test]
    fn test_validate_object_with_steps() {
        let bare = validate(&json!([{"id": "a", "type": "email"}])).unwrap();
        let wrapped = validate(&json!({"steps": [{"id": "a", "type": "email"}]})).unwrap();
        assert_eq!(bare, wrapped);
    }

    #[test]
    fn test_validate_rejects_other_shapes() {
        assert!(validate(&json!("x")).is_none());
        assert!(validate(&Value::Null).is_none());
        assert!(validate(&json!({"steps": "nope"})).is_none());
        assert!(validate(&json!(42)).is_none());
    }

    #[test]
    fn test_validate_drops_malformed_entries_keeps_order() {
        let steps = validate(&json!([
            {"id": "1", "type": "ipv4"},
            "garbage",
            {"type": "email"},
            {"id": "2"},
            null,
            {"id": "3", "type": "uuid", "enabled": false, "config": null},
        ]))
        .unwrap();
        let ids: Vec<_> = steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert!(!steps[1].enabled);
        assert!(steps[1].config.is_empty());
    }

    #[test]
    fn test_parse_malformed_json() {
        assert!(matches!(parse("{not json"), Err(RecipeError::Parse(_))));
    }

    #[test]
    fn test_parse_schema_errors() {
        assert!(matches!(parse(r#"{"steps": []}"#), Err(RecipeError::Schema(_))));
        assert!(matches!(parse(r#"{"version": 0, "steps": []}"#), Err(RecipeError::Schema(_))));
        assert!(matches!(parse(r#"{"version": 1, "steps": {}}"#), Err(RecipeError::Schema(_))));
        assert!(matches!(parse(r#"{"version": 1}"#), Err(RecipeError::Schema(_))));
        assert!(matches!(parse("[1, 2]"), Err(RecipeError::Schema(_))));
        assert!(matches!(parse(r#"{"version": "", "steps": []}"#), Err(RecipeError::Schema(_))));
    }

    #[test]
    fn test_truthy_non_integer_versions_import() {
        for version in [r#""1""#, "1.0", "true"] {
            let text = format!(r#"{{"version": {version}, "steps": [{{"type": "email"}}]}}"#);
            let doc = parse(&text).unwrap();
            assert_eq!(doc.version, RECIPE_VERSION);
            assert_eq!(doc.into_steps().len(), 1);
        }
        assert_eq!(parse(r#"{"version": 2, "steps": []}"#).unwrap().version, 2);
    }

    #[test]
    fn test_parse_regenerates_unique_ids() {
        let text = r#"{"version": 1, "name": "n", "steps": [
            {"id": "same", "type": "email"},
            {"id": "same", "type": "uuid"}
        ]}"#;
        let first = parse(text).unwrap().into_steps();
        let second = parse(text).unwrap().into_steps();
        let ids: HashSet<_> = first.iter().chain(second.iter()).map(|s| s.id.clone()).collect();
        assert_eq!(ids.len(), 4);
        assert!(!ids.contains("same"));
    }

    #[test]
    fn test_round_trip_preserves_type_enabled_config() {
        let steps = sample_steps();
        let text = serialize(&steps, "Mine").to_json().unwrap();
        let doc = serde_json::to_value(parse(&text).unwrap()).unwrap();
        let back = validate(&doc).unwrap();
        assert_eq!(back.len(), steps.len());
        for (orig, got) in steps.iter().zip(back.iter()) {
            assert_eq!(orig.kind, got.kind);
            assert_eq!(orig.enabled, got.enabled);
            assert_eq!(orig.config, got.config);
            assert_eq!(orig.label, got.label);
            assert_ne!(orig.id, got.id);
        }
    }

    #[test]
    fn test_serialize_document_shape() {
        let doc = serialize(&sample_steps(), "Mine");
        assert_eq!(doc.version, 1);
        assert_eq!(doc.name, "Mine");
        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("description").is_none());
        assert_eq!(value["steps"][0]["type"], "email");
    }

    #[test]
    fn test_load_example_regenerates_ids() {
        let steps = load_example("api trace cleaner").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].kind, StepKind::Jwt);
        assert_eq!(steps[0].config["partial"], json!(true));
        assert!(steps.iter().all(|s| !s.id.starts_with("ex_")));
        assert!(load_example("nope").is_none());
    }

    #[test]
    fn test_recipe_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(recipe_file_name(date), "scrubchef_recipe_2024-03-09.json");
    }

    #[test]
    fn test_load_recipe_rejects_extension() {
        let err = load_recipe(Path::new("pipeline.yaml")).unwrap_err();
        assert!(matches!(err, RecipeError::UnsupportedExtension(_)));
    }

    #[test]
    fn test_save_then_load_recipe_file() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let path = save_recipe(dir.path(), &sample_steps(), "Mine", date).unwrap();
        assert_eq!(path, dir.path().join("scrubchef_recipe_2025-01-02.json"));
        let loaded = load_recipe(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[2].kind, StepKind::Header);
    }
}
