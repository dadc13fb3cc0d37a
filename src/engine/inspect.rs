//! Step inspection: re-run pipeline prefixes to show what one step changed.

use super::{EngineAdapter, RunRequest, RunResult};
use crate::canonical::CanonicalMap;
use crate::normalize::{NormalizedStep, PipelineConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;

/// A raw engine that can execute one pipeline against one input.
#[async_trait]
pub trait PipelineRunner: Send {
    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Run `config` over `input`. The returned map describes this run only.
    async fn run_pipeline(&mut self, input: &str, config: &PipelineConfig) -> Result<(String, CanonicalMap)>;
}

/// The two prefix pipelines around an inspected step.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectionPrefixes {
    /// Enabled steps strictly before the target.
    pub before: PipelineConfig,
    /// Enabled steps up to and including the target.
    pub including: PipelineConfig,
}

/// Locate `target` in `steps` and cut the prefixes. `None` if absent.
pub fn inspection_prefixes(steps: &[NormalizedStep], target: &str) -> Option<InspectionPrefixes> {
    let index = steps.iter().position(|s| s.id() == target)?;
    let enabled = |slice: &[NormalizedStep]| -> Vec<NormalizedStep> {
        slice.iter().filter(|s| s.enabled()).cloned().collect()
    };
    Some(InspectionPrefixes {
        before: PipelineConfig::new(enabled(&steps[..index])),
        including: PipelineConfig::new(enabled(&steps[..=index])),
    })
}

/// Adapter over a `PipelineRunner` that serves inspection itself:
/// one dispatch becomes up to three runs on the same input.
pub struct InspectingEngine<R> {
    runner: R,
}

impl<R: PipelineRunner> InspectingEngine<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }
}

#[async_trait]
impl<R: PipelineRunner> EngineAdapter for InspectingEngine<R> {
    async fn init(&mut self) -> Result<()> {
        self.runner.init().await
    }

    async fn run(&mut self, request: RunRequest) -> Result<RunResult> {
        // Full run first; its map is the one that matches `output`.
        let (output, map) = self
            .runner
            .run_pipeline(&request.input, &request.config)
            .await?;

        let mut result = RunResult {
            output,
            map,
            ..Default::default()
        };

        let Some(target) = request.inspect_target.as_deref().filter(|t| !t.is_empty()) else {
            return Ok(result);
        };

        match inspection_prefixes(&request.config.steps, target) {
            Some(prefixes) => {
                tracing::debug!(
                    step = target,
                    before = prefixes.before.steps.len(),
                    including = prefixes.including.steps.len(),
                    "inspecting step"
                );
                let (original, _) = self
                    .runner
                    .run_pipeline(&request.input, &prefixes.before)
                    .await
                    .context("inspection run (before step) failed")?;
                let (modified, _) = self
                    .runner
                    .run_pipeline(&request.input, &prefixes.including)
                    .await
                    .context("inspection run (including step) failed")?;
                result.diff_original = original;
                result.diff_modified = modified;
            }
            None => tracing::debug!(step = target, "inspected step not in pipeline"),
        }

        Ok(result)
    }
}
