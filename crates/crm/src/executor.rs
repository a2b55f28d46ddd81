//! Execution engine - runs a plan in order, rolls back on failure
//!
//! Steps run strictly one after the other. The first failure stops the
//! forward pass; unless rollback is disabled, the steps completed so far are
//! then undone in reverse completion order, stopping at the first rollback
//! failure.

use crate::context::{ActionContext, ProgressCallback};
use crate::error::{RunError, StepError};
use crate::planner::ExecutionPlan;
use crate::resource::Resource;
use crate::types::{ActionOutcome, RunOptions, StepState, Verb};
use serde::Serialize;

/// Final state of one plan step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub rid: String,
    pub state: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Report of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub verb: Verb,
    pub steps: Vec<Step>,
    #[serde(skip)]
    pub error: Option<RunError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// RIDs whose step ended in the given state
    pub fn rids_in(&self, state: StepState) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.state == state)
            .map(|s| s.rid.as_str())
            .collect()
    }

    /// Turn the report into a `Result`, keeping the report on success
    pub fn into_result(self) -> Result<RunReport, RunError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Run a plan
///
/// # Arguments
/// * `plan` - Ordered resources and the verb to apply
/// * `opts` - dry run, rollback switch, driver flags
/// * `ctx` - Context handed to every driver call
/// * `progress` - Progress callback
///
/// An empty plan is a successful no-op.
pub fn run<P: ProgressCallback>(
    plan: &ExecutionPlan<'_>,
    opts: &RunOptions,
    ctx: &ActionContext,
    progress: &mut P,
) -> RunReport {
    let verb = plan.verb();
    let mut ctx = ActionContext {
        dry_run: opts.dry_run,
        force: opts.force,
        leader: opts.leader,
        ..ctx.clone()
    };

    let mut steps: Vec<Step> = plan
        .steps()
        .iter()
        .map(|r| Step {
            rid: r.rid().to_string(),
            state: StepState::Pending,
            detail: None,
        })
        .collect();

    progress.on_plan(verb, &plan.rids());

    let mut completed: Vec<usize> = Vec::new();
    let mut failure: Option<StepError> = None;

    for (index, resource) in plan.steps().iter().enumerate() {
        set_state(&mut steps[index], progress, verb, StepState::Running, None);

        match apply_step(*resource, verb, &mut ctx) {
            Ok(ActionOutcome::Done { detail }) => {
                set_state(&mut steps[index], progress, verb, StepState::Succeeded, detail);
                completed.push(index);
            }
            Ok(ActionOutcome::Skipped { reason }) => {
                set_state(&mut steps[index], progress, verb, StepState::Skipped, Some(reason));
            }
            Err(err) if resource.is_optional() => {
                log::warn!("{}: optional resource {} failed: {:#}", resource.rid(), verb, err);
                let reason = format!("optional, {err:#}");
                set_state(&mut steps[index], progress, verb, StepState::Skipped, Some(reason));
            }
            Err(err) => {
                let step_err = StepError::new(resource.rid(), verb, &err);
                set_state(
                    &mut steps[index],
                    progress,
                    verb,
                    StepState::Failed,
                    Some(step_err.message.clone()),
                );
                failure = Some(step_err);
                break;
            }
        }
    }

    let Some(failed) = failure else {
        return RunReport {
            verb,
            steps,
            error: None,
        };
    };

    let rollback = match verb.rollback() {
        Some(inverse) if !opts.disable_rollback => {
            roll_back(plan, &completed, inverse, &mut ctx, &mut steps, progress)
        }
        Some(_) => {
            log::info!("rollback disabled, leaving {} resources in place", completed.len());
            None
        }
        None => None,
    };

    RunReport {
        verb,
        steps,
        error: Some(RunError { failed, rollback }),
    }
}

/// Undo completed steps, most recent first, stopping at the first failure
fn roll_back<P: ProgressCallback>(
    plan: &ExecutionPlan<'_>,
    completed: &[usize],
    inverse: Verb,
    ctx: &mut ActionContext,
    steps: &mut [Step],
    progress: &mut P,
) -> Option<StepError> {
    for &index in completed.iter().rev() {
        let resource = plan.steps()[index];
        set_state(&mut steps[index], progress, inverse, StepState::RollingBack, None);

        match apply_step(resource, inverse, ctx) {
            Ok(_) => {
                set_state(&mut steps[index], progress, inverse, StepState::RolledBack, None);
            }
            Err(err) => {
                let step_err = StepError::new(resource.rid(), inverse, &err);
                set_state(
                    &mut steps[index],
                    progress,
                    inverse,
                    StepState::RollbackFailed,
                    Some(step_err.message.clone()),
                );
                return Some(step_err);
            }
        }
    }
    None
}

fn apply_step(
    resource: &dyn Resource,
    verb: Verb,
    ctx: &mut ActionContext,
) -> anyhow::Result<ActionOutcome> {
    log::debug!("{}: {}", resource.rid(), verb);
    resource.action(verb, ctx)
}

fn set_state<P: ProgressCallback>(
    step: &mut Step,
    progress: &mut P,
    verb: Verb,
    state: StepState,
    detail: Option<String>,
) {
    step.state = state;
    step.detail = detail;
    progress.on_step(&step.rid, verb, state, step.detail.as_deref());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{NoProgress, RecordProgress};
    use crate::resource::BoxedResource;
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<String>>>;

    /// Resource failing on demand, recording every call
    #[derive(Debug)]
    struct TestResource {
        rid: &'static str,
        seq: Option<i64>,
        fail_on: Option<Verb>,
        optional: bool,
        calls: Calls,
    }

    impl Resource for TestResource {
        fn rid(&self) -> &str {
            self.rid
        }

        fn seq(&self) -> Option<i64> {
            self.seq
        }

        fn is_optional(&self) -> bool {
            self.optional
        }

        fn action(&self, verb: Verb, ctx: &mut ActionContext) -> anyhow::Result<ActionOutcome> {
            if ctx.dry_run {
                return Ok(ActionOutcome::skipped("dry run"));
            }
            self.calls.lock().unwrap().push(format!("{verb} {}", self.rid));
            if self.fail_on == Some(verb) {
                anyhow::bail!("{} refused to {}", self.rid, verb);
            }
            Ok(ActionOutcome::done())
        }
    }

    fn resource(rid: &'static str, seq: i64, fail_on: Option<Verb>, calls: &Calls) -> BoxedResource {
        Box::new(TestResource {
            rid,
            seq: Some(seq),
            fail_on,
            optional: false,
            calls: Arc::clone(calls),
        })
    }

    fn run_plan(resources: &[BoxedResource], verb: Verb, opts: &RunOptions) -> RunReport {
        let plan = ExecutionPlan::build(resources.iter().map(|r| &**r).collect(), verb);
        run(&plan, opts, &ActionContext::default(), &mut NoProgress)
    }

    fn calls(calls: &Calls) -> Vec<String> {
        calls.lock().unwrap().clone()
    }

    #[test]
    fn test_empty_plan_is_success() {
        let report = run_plan(&[], Verb::Start, &RunOptions::default());
        assert!(report.is_success());
        assert!(report.steps.is_empty());
    }

    #[test]
    fn test_all_steps_succeed() {
        let log = Calls::default();
        let res = vec![
            resource("app#1", 1, None, &log),
            resource("ip#1", 2, None, &log),
        ];
        let report = run_plan(&res, Verb::Start, &RunOptions::default());
        assert!(report.is_success());
        assert_eq!(calls(&log), ["start app#1", "start ip#1"]);
        assert_eq!(report.rids_in(StepState::Succeeded), ["app#1", "ip#1"]);
        assert_eq!(report.into_result().unwrap().steps.len(), 2);
    }

    #[test]
    fn test_rollback_reverses_completed_steps() {
        let log = Calls::default();
        let res = vec![
            resource("app#1", 1, None, &log),
            resource("app#2", 2, None, &log),
            resource("app#3", 3, Some(Verb::Start), &log),
            resource("app#4", 4, None, &log),
        ];
        let report = run_plan(&res, Verb::Start, &RunOptions::default());

        assert_eq!(
            calls(&log),
            ["start app#1", "start app#2", "start app#3", "stop app#2", "stop app#1"]
        );
        assert_eq!(report.rids_in(StepState::RolledBack), ["app#1", "app#2"]);
        assert_eq!(report.rids_in(StepState::Failed), ["app#3"]);
        assert_eq!(report.rids_in(StepState::Pending), ["app#4"]);

        let err = report.into_result().unwrap_err();
        assert_eq!(err.failed.rid, "app#3");
        assert!(err.rollback.is_none());
    }

    #[test]
    fn test_rollback_stops_at_first_rollback_failure() {
        let log = Calls::default();
        let res = vec![
            resource("app#1", 1, None, &log),
            resource("app#2", 2, None, &log),
            resource("app#3", 3, Some(Verb::Stop), &log),
            resource("app#4", 4, Some(Verb::Start), &log),
        ];
        let report = run_plan(&res, Verb::Start, &RunOptions::default());

        assert_eq!(
            calls(&log),
            ["start app#1", "start app#2", "start app#3", "start app#4", "stop app#3"]
        );
        assert_eq!(report.rids_in(StepState::RollbackFailed), ["app#3"]);
        assert_eq!(report.rids_in(StepState::Succeeded), ["app#1", "app#2"]);

        let err = report.error.unwrap();
        assert_eq!(err.failed.rid, "app#4");
        assert_eq!(err.rollback.as_ref().unwrap().rid, "app#3");
        assert!(err.to_string().contains("rollback aborted"));
    }

    #[test]
    fn test_disable_rollback() {
        let log = Calls::default();
        let res = vec![
            resource("app#1", 1, None, &log),
            resource("app#2", 2, None, &log),
            resource("app#3", 3, Some(Verb::Stop), &log),
            resource("app#4", 4, Some(Verb::Start), &log),
        ];
        let opts = RunOptions {
            disable_rollback: true,
            ..Default::default()
        };
        let report = run_plan(&res, Verb::Start, &opts);

        assert_eq!(
            calls(&log),
            ["start app#1", "start app#2", "start app#3", "start app#4"]
        );
        let err = report.error.unwrap();
        assert_eq!(err.failed.rid, "app#4");
        assert!(err.rollback.is_none());
    }

    #[test]
    fn test_stop_failure_does_not_roll_back() {
        let log = Calls::default();
        let res = vec![
            resource("app#1", 1, None, &log),
            resource("app#2", 2, Some(Verb::Stop), &log),
        ];
        let report = run_plan(&res, Verb::Stop, &RunOptions::default());
        assert_eq!(calls(&log), ["stop app#2"]);
        assert!(!report.is_success());
    }

    #[test]
    fn test_optional_failure_is_not_fatal() {
        let log = Calls::default();
        let res: Vec<BoxedResource> = vec![
            Box::new(TestResource {
                rid: "app#1",
                seq: Some(1),
                fail_on: Some(Verb::Start),
                optional: true,
                calls: Arc::clone(&log),
            }),
            resource("app#2", 2, None, &log),
        ];
        let report = run_plan(&res, Verb::Start, &RunOptions::default());
        assert!(report.is_success());
        assert_eq!(report.rids_in(StepState::Skipped), ["app#1"]);
        assert_eq!(report.rids_in(StepState::Succeeded), ["app#2"]);
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let log = Calls::default();
        let res = vec![resource("app#1", 1, Some(Verb::Start), &log)];
        let opts = RunOptions {
            dry_run: true,
            ..Default::default()
        };
        let report = run_plan(&res, Verb::Start, &opts);
        assert!(report.is_success());
        assert!(calls(&log).is_empty());
    }

    #[test]
    fn test_progress_sees_state_machine() {
        let log = Calls::default();
        let res = vec![
            resource("app#1", 1, None, &log),
            resource("ip#1", 2, Some(Verb::Start), &log),
        ];
        let plan = ExecutionPlan::build(res.iter().map(|r| &**r).collect(), Verb::Start);
        let mut progress = RecordProgress::default();
        run(&plan, &RunOptions::default(), &ActionContext::default(), &mut progress);

        let states: Vec<(String, StepState)> = progress
            .events
            .into_iter()
            .map(|(rid, _, state)| (rid, state))
            .collect();
        assert_eq!(
            states,
            [
                ("app#1".to_string(), StepState::Running),
                ("app#1".to_string(), StepState::Succeeded),
                ("ip#1".to_string(), StepState::Running),
                ("ip#1".to_string(), StepState::Failed),
                ("app#1".to_string(), StepState::RollingBack),
                ("app#1".to_string(), StepState::RolledBack),
            ]
        );
    }
}
