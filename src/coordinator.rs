//! Execution coordination between user edits and the single engine.
//!
//! [`Coordinator`] is the pure state machine: every event returns the run
//! request to send, if any. [`run_coordinator`] drives it from a `watch`
//! channel of desired states (overwrite-on-send, so edits coalesce for free)
//! and the engine worker's response channel, publishing a [`SessionView`]
//! after every event. At most one run is ever in flight.

use crate::canonical::CanonicalMap;
use crate::engine::{EngineHandle, EngineRequest, EngineResponse, RunRequest, RunResult};
use crate::normalize::build_pipeline_config;
use crate::step::Step;
use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};

/// Everything the user can change that affects engine output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredState {
    pub input: String,
    pub steps: Vec<Step>,
    pub inspect_target: Option<String>,
    /// Bumped by the publisher on every change; echoed back in the view.
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineStatus {
    #[default]
    Loading,
    Ready,
    /// Initialization failed. Terminal for the session.
    Failed,
}

/// What the user sees. `output`, `map` and the diffs always come from the
/// same result; after a run error they are the error text and empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub engine: EngineStatus,
    pub busy: bool,
    pub output: String,
    pub map: CanonicalMap,
    pub diff_original: String,
    pub diff_modified: String,
    pub inspected: Option<String>,
    pub error: Option<String>,
    /// Revision of the desired state behind the latest result or error.
    pub revision: u64,
    /// Revision waiting in the pending slot, if any.
    pub stashed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Busy,
}

pub struct Coordinator {
    engine: EngineStatus,
    phase: Phase,
    latest: Option<DesiredState>,
    pending: Option<DesiredState>,
    in_flight: Option<(u64, Option<String>)>,
    view: SessionView,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            engine: EngineStatus::Loading,
            phase: Phase::Idle,
            latest: None,
            pending: None,
            in_flight: None,
            view: SessionView::default(),
        }
    }

    pub fn view(&self) -> &SessionView {
        &self.view
    }

    pub fn is_busy(&self) -> bool {
        self.phase == Phase::Busy
    }

    pub fn is_initializing(&self) -> bool {
        self.engine == EngineStatus::Loading
    }

    pub fn pending(&self) -> Option<&DesiredState> {
        self.pending.as_ref()
    }

    pub fn on_engine_ready(&mut self) -> Option<RunRequest> {
        self.engine = EngineStatus::Ready;
        self.view.engine = EngineStatus::Ready;
        let latest = self.latest.clone()?;
        Some(self.dispatch(latest))
    }

    pub fn on_init_error(&mut self, message: String) {
        tracing::error!(%message, "engine unavailable for this session");
        self.engine = EngineStatus::Failed;
        self.view.engine = EngineStatus::Failed;
        self.view.output = format!("Error: {}", message);
        self.view.error = Some(message);
    }

    pub fn on_desired_state_changed(&mut self, desired: DesiredState) -> Option<RunRequest> {
        self.latest = Some(desired.clone());
        match (self.engine, self.phase) {
            (EngineStatus::Ready, Phase::Idle) => {
                // A slot left behind by a failed run is older than this.
                self.set_pending(None);
                Some(self.dispatch(desired))
            }
            (EngineStatus::Ready, Phase::Busy) => {
                if let Some(dropped) = &self.pending {
                    tracing::debug!(revision = dropped.revision, "superseded pending update");
                }
                tracing::debug!(revision = desired.revision, "engine busy, update stashed");
                self.set_pending(Some(desired));
                None
            }
            // Remembered in `latest`; dispatched once the engine is ready.
            (EngineStatus::Loading, _) | (EngineStatus::Failed, _) => None,
        }
    }

    pub fn on_result(&mut self, result: RunResult) -> Option<RunRequest> {
        if self.phase != Phase::Busy {
            tracing::warn!("engine result with no run in flight, ignored");
            return None;
        }
        let (revision, inspected) = self.in_flight.take().unwrap_or_default();
        self.view.output = result.output;
        self.view.map = result.map;
        self.view.diff_original = result.diff_original;
        self.view.diff_modified = result.diff_modified;
        self.view.inspected = inspected;
        self.view.error = None;
        self.view.revision = revision;
        self.set_phase(Phase::Idle);

        let next = self.pending.take()?;
        self.view.stashed = None;
        tracing::debug!(revision = next.revision, "flushing pending update");
        Some(self.dispatch(next))
    }

    /// A failed run. Any stashed update stays stashed until the next change.
    pub fn on_error(&mut self, message: String) {
        if self.phase != Phase::Busy {
            tracing::warn!(%message, "engine error with no run in flight");
        }
        let (revision, _) = self.in_flight.take().unwrap_or_default();
        tracing::warn!(revision, pending = self.pending.is_some(), %message, "engine run failed");
        // Nothing from the previous result survives next to the error.
        self.view.output = format!("Error: {}", message);
        self.view.map = CanonicalMap::default();
        self.view.diff_original.clear();
        self.view.diff_modified.clear();
        self.view.inspected = None;
        self.view.error = Some(message);
        self.view.revision = revision;
        self.set_phase(Phase::Idle);
    }

    fn dispatch(&mut self, desired: DesiredState) -> RunRequest {
        let config = build_pipeline_config(&desired.steps);
        let inspect_target = desired.inspect_target.filter(|t| !t.is_empty());
        tracing::info!(
            revision = desired.revision,
            steps = config.steps.len(),
            input_len = desired.input.len(),
            inspect = ?inspect_target,
            "dispatching run"
        );
        self.in_flight = Some((desired.revision, inspect_target.clone()));
        self.set_phase(Phase::Busy);
        RunRequest {
            input: desired.input,
            config,
            inspect_target,
        }
    }

    fn set_pending(&mut self, pending: Option<DesiredState>) {
        self.view.stashed = pending.as_ref().map(|p| p.revision);
        self.pending = pending;
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.view.busy = phase == Phase::Busy;
    }
}

/// Drive a [`Coordinator`] until the desired-state sender is dropped and no
/// run is in flight.
pub async fn run_coordinator(
    engine: EngineHandle,
    mut desired_rx: watch::Receiver<DesiredState>,
    view_tx: watch::Sender<SessionView>,
) -> Result<()> {
    let EngineHandle {
        requests,
        mut responses,
        task: _task,
    } = engine;
    let mut coordinator = Coordinator::new();

    let initial = desired_rx.borrow_and_update().clone();
    coordinator.on_desired_state_changed(initial);
    requests
        .send(EngineRequest::Init)
        .await
        .context("engine worker is gone")?;

    let mut inputs_open = true;
    loop {
        tokio::select! {
            changed = desired_rx.changed(), if inputs_open => {
                match changed {
                    Ok(()) => {
                        let desired = desired_rx.borrow_and_update().clone();
                        let next = coordinator.on_desired_state_changed(desired);
                        send_run(&requests, next).await?;
                    }
                    Err(_) => inputs_open = false,
                }
            }
            response = responses.recv() => {
                let Some(response) = response else {
                    anyhow::bail!("engine worker stopped unexpectedly");
                };
                match response {
                    EngineResponse::Ready => {
                        let next = coordinator.on_engine_ready();
                        send_run(&requests, next).await?;
                    }
                    EngineResponse::Result(result) => {
                        let next = coordinator.on_result(result);
                        send_run(&requests, next).await?;
                    }
                    EngineResponse::Error { message } if coordinator.is_initializing() => {
                        coordinator.on_init_error(message);
                    }
                    EngineResponse::Error { message } => coordinator.on_error(message),
                }
            }
        }

        view_tx.send_replace(coordinator.view().clone());

        if !inputs_open && !coordinator.is_busy() {
            break;
        }
    }

    tracing::debug!("coordinator stopped");
    Ok(())
}

async fn send_run(requests: &mpsc::Sender<EngineRequest>, run: Option<RunRequest>) -> Result<()> {
    if let Some(run) = run {
        requests
            .send(EngineRequest::Run(run))
            .await
            .context("engine worker is gone")?;
    }
    Ok(())
}
