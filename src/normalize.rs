use crate::step::{Step, StepConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PIPELINE_VERSION: u32 = 1;

/// A step whose config is in the exact shape the engine expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedStep(Step);

impl NormalizedStep {
    pub fn step(&self) -> &Step {
        &self.0
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn enabled(&self) -> bool {
        self.0.enabled
    }

    pub fn into_step(self) -> Step {
        self.0
    }
}

/// Engine-facing pipeline: enabled steps only, in their original order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub version: u32,
    pub steps: Vec<NormalizedStep>,
}

impl PipelineConfig {
    pub fn new(steps: Vec<NormalizedStep>) -> Self {
        Self {
            version: PIPELINE_VERSION,
            steps,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

/// Normalize one step for the engine. The stored step is left untouched.
pub fn normalize(step: &Step) -> NormalizedStep {
    let mut normalized = step.clone();
    if let Some(field) = step.kind.list_field() {
        normalize_list_field(&mut normalized.config, field);
    }
    NormalizedStep(normalized)
}

/// Build the engine config from the live step sequence.
pub fn build_pipeline_config(steps: &[Step]) -> PipelineConfig {
    PipelineConfig::new(steps.iter().filter(|s| s.enabled).map(normalize).collect())
}

/// Split a comma-separated list: trim each element, drop empties, keep order.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_list_field(config: &mut StepConfig, field: &str) {
    let value = match config.get(field) {
        Some(Value::String(raw)) => Value::from(split_list(raw)),
        Some(Value::Array(_)) => return,
        // Absent or null both mean "no entries".
        Some(Value::Null) | None => Value::Array(Vec::new()),
        // Anything else is not ours to reinterpret.
        Some(_) => return,
    };
    config.insert(field.to_string(), value);
}
