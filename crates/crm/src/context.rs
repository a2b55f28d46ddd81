//! Action context and progress callback traits
//!
//! These allow the runner to be used without depending on how the caller
//! logs or renders progress.

use crate::types::{StepState, Verb};

/// Context passed to resource actions
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    pub dry_run: bool,
    pub force: bool,
    pub leader: bool,
    /// Extra environment for driver subprocesses
    pub env: Vec<(String, String)>,
}

impl ActionContext {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    /// Add an environment variable for driver subprocesses
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Progress callback for runs
pub trait ProgressCallback {
    /// Called before a plan starts
    fn on_plan(&mut self, _verb: Verb, _rids: &[&str]) {}

    /// Called when a step changes state
    fn on_step(&mut self, rid: &str, verb: Verb, state: StepState, detail: Option<&str>);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_step(&mut self, _rid: &str, _verb: Verb, _state: StepState, _detail: Option<&str>) {}
}

/// Progress callback recording every transition, mostly useful in tests
#[derive(Debug, Default)]
pub struct RecordProgress {
    pub events: Vec<(String, Verb, StepState)>,
}

impl ProgressCallback for RecordProgress {
    fn on_step(&mut self, rid: &str, verb: Verb, state: StepState, _detail: Option<&str>) {
        self.events.push((rid.to_string(), verb, state));
    }
}
