use crate::coordinator::{run_coordinator, DesiredState, EngineStatus, SessionView};
use crate::engine::{spawn_worker, EngineAdapter};
use crate::recipe::new_step_id;
use crate::step::{Step, StepConfig, StepKind};
use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Editable state behind the live view. Every mutation republishes the
/// desired state; the coordinator decides when the engine sees it.
pub struct Session {
    input: String,
    input_name: Option<String>,
    steps: Vec<Step>,
    selected: Option<String>,
    revision: u64,
    desired_tx: watch::Sender<DesiredState>,
}

impl Session {
    pub fn new(desired_tx: watch::Sender<DesiredState>) -> Self {
        Self {
            input: String::new(),
            input_name: None,
            steps: Vec::new(),
            selected: None,
            revision: 0,
            desired_tx,
        }
    }

    /// Start the engine worker and coordinator for `engine`.
    pub fn spawn<E>(engine: E) -> (Self, watch::Receiver<SessionView>, JoinHandle<Result<()>>)
    where
        E: EngineAdapter + 'static,
    {
        let (desired_tx, desired_rx) = watch::channel(DesiredState::default());
        let (view_tx, view_rx) = watch::channel(SessionView::default());
        let handle = spawn_worker(engine);
        let task = tokio::spawn(run_coordinator(handle, desired_rx, view_tx));
        (Self::new(desired_tx), view_rx, task)
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// File name the current input came from, if any.
    pub fn input_name(&self) -> Option<&str> {
        self.input_name.as_deref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Revision of the most recently published desired state.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn step_id_at(&self, index: usize) -> Option<&str> {
        self.steps.get(index).map(|s| s.id.as_str())
    }

    pub fn set_input(&mut self, input: impl Into<String>, name: Option<String>) {
        self.input = input.into();
        self.input_name = name;
        self.publish();
    }

    pub fn clear_input(&mut self) {
        self.input.clear();
        self.input_name = None;
        self.publish();
    }

    /// Append a new enabled step with an empty config. Returns its id.
    pub fn add_step(&mut self, kind: StepKind) -> String {
        let step = Step::new(new_step_id(), kind);
        let id = step.id.clone();
        self.steps.push(step);
        self.publish();
        id
    }

    pub fn remove_step(&mut self, id: &str) -> bool {
        let before = self.steps.len();
        self.steps.retain(|s| s.id != id);
        if self.steps.len() == before {
            return false;
        }
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
        self.publish();
        true
    }

    pub fn toggle_step(&mut self, id: &str) -> bool {
        self.edit_step(id, |s| s.enabled = !s.enabled)
    }

    pub fn set_config(&mut self, id: &str, config: StepConfig) -> bool {
        self.edit_step(id, |s| s.config = config)
    }

    pub fn set_label(&mut self, id: &str, label: Option<String>) -> bool {
        self.edit_step(id, |s| s.label = label)
    }

    /// Move the step at `from` to position `to`, shifting the rest.
    pub fn move_step(&mut self, from: usize, to: usize) -> bool {
        if from >= self.steps.len() || to >= self.steps.len() {
            return false;
        }
        if from != to {
            let step = self.steps.remove(from);
            self.steps.insert(to, step);
            self.publish();
        }
        true
    }

    pub fn clear_steps(&mut self) {
        self.steps.clear();
        self.selected = None;
        self.publish();
    }

    /// Replace the whole pipeline (recipe import, example load).
    pub fn load_steps(&mut self, steps: Vec<Step>) {
        tracing::info!(steps = steps.len(), "pipeline replaced");
        self.steps = steps;
        self.selected = None;
        self.publish();
    }

    /// Inspect a step, or stop inspecting with `None`.
    pub fn select(&mut self, id: Option<&str>) {
        self.selected = id.map(str::to_string);
        self.publish();
    }

    /// Selecting the already selected step deselects it.
    pub fn toggle_select(&mut self, id: &str) {
        if self.selected.as_deref() == Some(id) {
            self.select(None);
        } else {
            self.select(Some(id));
        }
    }

    fn edit_step(&mut self, id: &str, edit: impl FnOnce(&mut Step)) -> bool {
        let Some(step) = self.steps.iter_mut().find(|s| s.id == id) else {
            return false;
        };
        edit(step);
        self.publish();
        true
    }

    fn publish(&mut self) {
        self.revision += 1;
        self.desired_tx.send_replace(DesiredState {
            input: self.input.clone(),
            steps: self.steps.clone(),
            inspect_target: self.selected.clone(),
            revision: self.revision,
        });
    }
}

/// Wait until the view reflects `revision` (or later) with nothing in
/// flight. Also returns on engine failure, or when a run error left that
/// revision stranded in the pending slot; neither would settle on its own.
pub async fn settled(view_rx: &mut watch::Receiver<SessionView>, revision: u64) -> Result<SessionView> {
    loop {
        {
            let view = view_rx.borrow_and_update();
            if is_settled(&view, revision) {
                return Ok(view.clone());
            }
        }
        view_rx
            .changed()
            .await
            .context("coordinator stopped before the view settled")?;
    }
}

fn is_settled(view: &SessionView, revision: u64) -> bool {
    match view.engine {
        EngineStatus::Failed => true,
        EngineStatus::Loading => false,
        EngineStatus::Ready if view.busy => false,
        EngineStatus::Ready => {
            let stranded = view.error.is_some() && view.stashed.is_some_and(|r| r >= revision);
            view.revision >= revision || stranded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ready(revision: u64) -> SessionView {
        SessionView {
            engine: EngineStatus::Ready,
            revision,
            ..Default::default()
        }
    }

    #[test]
    fn test_is_settled() {
        assert!(is_settled(&ready(3), 3));
        assert!(!is_settled(&ready(2), 3));
        let mut busy = ready(3);
        busy.busy = true;
        assert!(!is_settled(&busy, 3));
        assert!(!is_settled(&SessionView::default(), 0));

        // An older error does not count as settled.
        let mut failed_run = ready(2);
        failed_run.error = Some("boom".to_string());
        assert!(!is_settled(&failed_run, 3));
        failed_run.stashed = Some(3);
        assert!(is_settled(&failed_run, 3));

        let init_failed = SessionView {
            engine: EngineStatus::Failed,
            ..Default::default()
        };
        assert!(is_settled(&init_failed, 9));
    }

    fn session() -> (Session, watch::Receiver<DesiredState>) {
        let (tx, rx) = watch::channel(DesiredState::default());
        (Session::new(tx), rx)
    }

    #[test]
    fn test_every_edit_publishes() {
        let (mut s, rx) = session();
        s.set_input("hello", None);
        let id = s.add_step(StepKind::Email);
        s.toggle_step(&id);
        s.select(Some(&id));

        let desired = rx.borrow().clone();
        assert_eq!(desired.revision, 4);
        assert_eq!(desired.input, "hello");
        assert!(!desired.steps[0].enabled);
        assert_eq!(desired.inspect_target.as_deref(), Some(id.as_str()));
    }

    #[test]
    fn test_unknown_id_is_a_noop() {
        let (mut s, rx) = session();
        assert!(!s.toggle_step("missing"));
        assert!(!s.remove_step("missing"));
        assert_eq!(rx.borrow().revision, 0);
    }

    #[test]
    fn test_remove_clears_selection_of_removed_step() {
        let (mut s, _rx) = session();
        let a = s.add_step(StepKind::Email);
        let b = s.add_step(StepKind::Uuid);
        s.select(Some(&a));
        s.remove_step(&b);
        assert_eq!(s.selected(), Some(a.as_str()));
        s.remove_step(&a);
        assert_eq!(s.selected(), None);
    }

    #[test]
    fn test_move_step_array_semantics() {
        let (mut s, _rx) = session();
        let a = s.add_step(StepKind::Email);
        let b = s.add_step(StepKind::Uuid);
        let c = s.add_step(StepKind::Ipv4);
        assert!(s.move_step(0, 2));
        let ids: Vec<_> = s.steps().iter().map(|x| x.id.clone()).collect();
        assert_eq!(ids, vec![b, c, a]);
        assert!(!s.move_step(0, 3));
    }

    #[test]
    fn test_config_and_label_edits_keep_kind() {
        let (mut s, rx) = session();
        let id = s.add_step(StepKind::Header);
        let config = json!({"names": "Cookie, Authorization"}).as_object().cloned().unwrap();
        assert!(s.set_config(&id, config));
        assert!(s.set_label(&id, Some("Auth".to_string())));
        let desired = rx.borrow().clone();
        assert_eq!(desired.steps[0].kind, StepKind::Header);
        assert_eq!(desired.steps[0].config["names"], "Cookie, Authorization");
        assert_eq!(desired.steps[0].label.as_deref(), Some("Auth"));
    }

    #[test]
    fn test_toggle_select() {
        let (mut s, _rx) = session();
        let id = s.add_step(StepKind::Email);
        s.toggle_select(&id);
        assert_eq!(s.selected(), Some(id.as_str()));
        s.toggle_select(&id);
        assert_eq!(s.selected(), None);
    }

    #[test]
    fn test_load_and_clear_steps() {
        let (mut s, _rx) = session();
        let id = s.add_step(StepKind::Email);
        s.select(Some(&id));
        s.load_steps(vec![Step::new("x", StepKind::Mac)]);
        assert_eq!(s.steps().len(), 1);
        assert_eq!(s.selected(), None);
        s.clear_steps();
        assert!(s.steps().is_empty());
    }
}
