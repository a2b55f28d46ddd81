//! Local execution of object and node actions
//!
//! Mutating actions run under the object's action lock. Resource verbs go
//! through the `crm` runner; every step transition is appended to the
//! object's action log.

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use crate::actions::LocalOp;
use crate::lock::{self, LockGuard};
use crate::object::{KeywordRef, LOCK_FILE, Object, ObjectStatus, remove_flag, write_flag};
use crate::path::ObjectPath;
use crate::paths::Paths;
use crate::request::ActionRequest;
use crate::results::ActionResult;
use crate::ui;
use crm::{
    ActionContext, Barrier, BoxedResource, ExecutionPlan, ProgressCallback, Resource, RunReport,
    StepState, Verb,
};

/// Runs actions against this node's objects
pub struct LocalExecutor<'a> {
    paths: &'a Paths,
    nodename: &'a str,
    lock_timeout: Duration,
}

impl<'a> LocalExecutor<'a> {
    pub fn new(paths: &'a Paths, nodename: &'a str, lock_timeout: Duration) -> Self {
        Self {
            paths,
            nodename,
            lock_timeout,
        }
    }

    /// Run an object action; every failure ends up in the result
    pub fn run_object(&self, path: &ObjectPath, req: &ActionRequest) -> ActionResult {
        match self.try_object(path, req) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("{path}: {}: {e:#}", req.action());
                ActionResult::failed(Some(path.clone()), self.nodename, &e)
            }
        }
    }

    /// Run a node action on this node
    pub fn run_node(&self, req: &ActionRequest) -> ActionResult {
        let spec = req.action();
        let flag = self.paths.node_var().join("frozen");
        let outcome = match spec.local {
            Some(LocalOp::Freeze) => write_flag(&flag).map(|()| "frozen"),
            Some(LocalOp::Unfreeze) => remove_flag(&flag).map(|()| "thawed"),
            _ => Err(anyhow::anyhow!("{spec} cannot run locally")),
        };
        match outcome {
            Ok(state) => {
                log::info!("node {}: {state}", self.nodename);
                ActionResult::ok(None, self.nodename, json!({ "frozen": state == "frozen" }))
                    .with_human(format!("node {} {state}", self.nodename))
            }
            Err(e) => ActionResult::failed(None, self.nodename, &e),
        }
    }

    fn try_object(&self, path: &ObjectPath, req: &ActionRequest) -> Result<ActionResult> {
        let spec = req.action();
        let op = spec
            .local
            .with_context(|| format!("{spec} cannot run locally"))?;
        if !path.kind().supports(spec.requires) {
            bail!("{spec} is not supported for {} objects", path.kind());
        }

        let _guard = self.lock(path, req, op)?;

        if op == LocalOp::Create {
            Object::create(self.paths, path, req.from().map(PathBuf::as_path))?;
            return Ok(self.done(path, Value::Null, format!("{path}: created")));
        }

        let mut obj = Object::open(self.paths, path)?;
        self.apply(op, &mut obj, req)
    }

    fn apply(&self, op: LocalOp, obj: &mut Object, req: &ActionRequest) -> Result<ActionResult> {
        let path = &obj.path().clone();
        match op {
            LocalOp::Run(verb) => {
                let report = self.run_plan(obj, verb, req.barrier(), req)?;
                self.report(path, report)
            }
            LocalOp::Restart => {
                let stop = self.run_plan(obj, Verb::Stop, barrier_for(req.barrier(), Verb::Stop), req)?;
                if stop.error.is_some() {
                    return self.report(path, stop);
                }
                let start =
                    self.run_plan(obj, Verb::Start, barrier_for(req.barrier(), Verb::Start), req)?;
                self.report(path, start)
            }
            LocalOp::Purge => {
                let report = self.run_plan(obj, Verb::Unprovision, None, req)?;
                if let Some(err) = report.error {
                    bail!("unprovision failed, not deleting: {err}");
                }
                obj.delete()?;
                Ok(self.done(path, Value::Null, format!("{path}: purged")))
            }
            LocalOp::Status => {
                let status = obj.status(&self.context(obj))?;
                let human = render_status(&status);
                Ok(self.done(path, serde_json::to_value(&status)?, human))
            }
            LocalOp::Freeze => {
                obj.freeze()?;
                Ok(self.done(path, json!({ "frozen": true }), format!("{path}: frozen")))
            }
            LocalOp::Unfreeze => {
                obj.unfreeze()?;
                Ok(self.done(path, json!({ "frozen": false }), format!("{path}: thawed")))
            }
            LocalOp::Get | LocalOp::Eval => {
                let keywords = parse_keywords(req)?;
                let mut values = Vec::with_capacity(keywords.len());
                for kw in &keywords {
                    let value = if op == LocalOp::Eval {
                        obj.eval(kw, self.nodename)
                    } else {
                        obj.get(kw)
                    };
                    values.push(value.with_context(|| format!("{kw} is not set"))?);
                }
                Ok(keyword_result(self, path, &keywords, values))
            }
            LocalOp::Set => {
                let assignments = req
                    .keywords()
                    .iter()
                    .map(|s| KeywordRef::parse_assignment(s))
                    .collect::<Result<Vec<_>>>()?;
                if assignments.is_empty() {
                    bail!("set: at least one --kw <keyword>=<value> is required");
                }
                obj.set(&assignments)?;
                let n = assignments.len();
                Ok(self.done(path, json!({ "set": n }), format!("{path}: {n} keyword(s) set")))
            }
            LocalOp::Unset => {
                let keywords = parse_keywords(req)?;
                let n = obj.unset(&keywords)?;
                Ok(self.done(path, json!({ "unset": n }), format!("{path}: {n} keyword(s) removed")))
            }
            LocalOp::Delete => {
                obj.delete()?;
                Ok(self.done(path, Value::Null, format!("{path}: deleted")))
            }
            LocalOp::Logs => {
                let log_file = obj.log_file();
                let content = match fs::read_to_string(&log_file) {
                    Ok(content) => content,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                    Err(e) => {
                        return Err(e).with_context(|| format!("Could not read {}", log_file.display()));
                    }
                };
                let human = content.trim_end().to_string();
                Ok(self.done(path, Value::String(content), human))
            }
            LocalOp::Enter => self.enter(obj, req),
            LocalOp::Create => bail!("object {path} already exists"),
        }
    }

    fn lock(&self, path: &ObjectPath, req: &ActionRequest, op: LocalOp) -> Result<Option<LockGuard>> {
        let policy = req.lock();
        if !op.mutates() {
            return Ok(None);
        }
        if !policy.enabled {
            log::warn!("{path}: running {} without the action lock", req.action());
            return Ok(None);
        }
        let file = self.paths.object_var(path).join(LOCK_FILE);
        let timeout = policy.timeout.unwrap_or(self.lock_timeout);
        Ok(Some(lock::acquire(&file, timeout, req.action().name)?))
    }

    fn context(&self, obj: &Object) -> ActionContext {
        ActionContext {
            env: obj.env(self.nodename),
            ..ActionContext::default()
        }
    }

    fn run_plan(
        &self,
        obj: &Object,
        verb: Verb,
        barrier: Option<&Barrier>,
        req: &ActionRequest,
    ) -> Result<RunReport> {
        let resources: Vec<BoxedResource> = obj
            .resources()?
            .into_iter()
            .map(|r| Box::new(r) as BoxedResource)
            .collect();
        let selected = req.resources().filter(&resources);
        let plan = ExecutionPlan::build(selected, verb).truncate_at(barrier)?;
        log::debug!("{}: {verb} plan: {:?}", obj.path(), plan.rids());

        let mut progress = ObjectLog::open(obj);
        Ok(crm::run(&plan, req.run_options(), &self.context(obj), &mut progress))
    }

    fn report(&self, path: &ObjectPath, report: RunReport) -> Result<ActionResult> {
        let report = report.into_result().map_err(|err| anyhow::anyhow!("{err}"))?;
        let human = render_report(path, &report);
        Ok(self.done(path, serde_json::to_value(&report)?, human))
    }

    fn enter(&self, obj: &Object, req: &ActionRequest) -> Result<ActionResult> {
        let path = obj.path();
        let resources = obj.resources()?;
        let candidate = resources
            .iter()
            .filter(|r| !r.is_disabled() && req.resources().matches(*r as &dyn Resource))
            .find(|r| matches!(r.command("enter"), Ok(Some(_))))
            .with_context(|| format!("{path}: no resource with an enter command"))?;
        let status = candidate.enter(&self.context(obj))?;
        if !status.success() {
            bail!("{}: enter exited with {status}", candidate.rid());
        }
        Ok(self.done(path, Value::Null, String::new()))
    }

    fn done(&self, path: &ObjectPath, data: Value, human: String) -> ActionResult {
        let result = ActionResult::ok(Some(path.clone()), self.nodename, data);
        if human.is_empty() {
            result
        } else {
            result.with_human(human)
        }
    }
}

/// Barrier applicable to one half of a restart
fn barrier_for(barrier: Option<&Barrier>, verb: Verb) -> Option<&Barrier> {
    match (barrier, verb) {
        (Some(Barrier::UpTo(_)), Verb::Stop) | (Some(Barrier::DownTo(_)), Verb::Start) => None,
        (b, _) => b,
    }
}

fn parse_keywords(req: &ActionRequest) -> Result<Vec<KeywordRef>> {
    if req.keywords().is_empty() {
        bail!("{}: at least one --kw is required", req.action());
    }
    req.keywords().iter().map(|s| KeywordRef::parse(s)).collect()
}

fn keyword_result(
    exec: &LocalExecutor<'_>,
    path: &ObjectPath,
    keywords: &[KeywordRef],
    values: Vec<String>,
) -> ActionResult {
    if let [_] = keywords {
        let value = values.into_iter().next().unwrap_or_default();
        return exec.done(path, Value::String(value.clone()), value);
    }
    let mut map = Map::new();
    let mut human = String::new();
    for (kw, value) in keywords.iter().zip(values) {
        let _ = writeln!(human, "{kw} = {value}");
        map.insert(kw.to_string(), Value::String(value));
    }
    exec.done(path, Value::Object(map), human.trim_end().to_string())
}

fn render_report(path: &ObjectPath, report: &RunReport) -> String {
    let mut out = format!("{path}: {}", report.verb);
    if report.steps.is_empty() {
        out.push_str(" (nothing to do)");
    }
    for step in &report.steps {
        let _ = write!(out, "\n  {:<16} {}", step.rid, ui::state(&step.state.to_string()));
        if let Some(detail) = &step.detail {
            let _ = write!(out, "  {detail}");
        }
    }
    out
}

fn render_status(status: &ObjectStatus) -> String {
    let mut out = format!("{}  {}", status.path, ui::state(&status.avail.to_string()));
    if status.frozen {
        out.push_str("  frozen");
    }
    for r in &status.resources {
        let _ = write!(out, "\n  {:<16} {}", r.rid, ui::state(&r.status.to_string()));
        if r.disabled {
            out.push_str("  (disabled)");
        }
        if let Some(err) = &r.error {
            let _ = write!(out, "  {err}");
        }
    }
    out
}

/// Progress callback appending step transitions to the object's action log
struct ObjectLog {
    path: String,
    file: Option<File>,
}

impl ObjectLog {
    fn open(obj: &Object) -> Self {
        let log_file = obj.log_file();
        let file = fs::create_dir_all(obj.var_dir())
            .and_then(|()| OpenOptions::new().create(true).append(true).open(&log_file));
        let file = match file {
            Ok(f) => Some(f),
            Err(e) => {
                log::warn!("could not open {}: {e}", log_file.display());
                None
            }
        };
        Self {
            path: obj.path().to_string(),
            file,
        }
    }

    fn append(&mut self, line: &str) {
        if let Some(file) = &mut self.file {
            let ts = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            if let Err(e) = writeln!(file, "{ts} {line}") {
                log::warn!("{}: action log: {e}", self.path);
                self.file = None;
            }
        }
    }
}

impl ProgressCallback for ObjectLog {
    fn on_plan(&mut self, verb: Verb, rids: &[&str]) {
        log::info!("{}: {verb} {}", self.path, rids.join(" "));
        self.append(&format!("{verb} plan: {}", rids.join(" ")));
    }

    fn on_step(&mut self, rid: &str, verb: Verb, state: StepState, detail: Option<&str>) {
        let line = match detail {
            Some(detail) => format!("{verb} {rid} {state}: {detail}"),
            None => format!("{verb} {rid} {state}"),
        };
        match state {
            StepState::Failed | StepState::RollbackFailed => log::warn!("{}: {line}", self.path),
            StepState::Running | StepState::Pending => log::debug!("{}: {line}", self.path),
            _ => log::info!("{}: {line}", self.path),
        }
        self.append(&line);
    }
}
