//! Immutable action requests
//!
//! A request is built once per invocation from [`RequestParams`] by a
//! validating constructor, then handed by reference to the router, the
//! local runner and the orchestrator.

use serde_json::{Map, Value, json};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::actions::{ActionSpec, Scope, TargetSpec};
use crm::{Barrier, ResourceSelector, RunOptions};

/// Default convergence wait
pub const DEFAULT_WAIT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("{0}: an object selector is required")]
    MissingSelector(String),

    #[error("--{0} and --{1} are mutually exclusive")]
    Conflict(&'static str, &'static str),

    #[error("{0}: a destination node is required")]
    MissingDestination(String),

    #[error(transparent)]
    Resources(#[from] crm::Error),
}

/// Raw options, as parsed from the command line
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    pub selector: Option<String>,
    pub node: Option<String>,
    pub local: bool,
    pub rid: Option<String>,
    pub subset: Option<String>,
    pub tag: Option<String>,
    pub no_lock: bool,
    pub lock_timeout: Option<Duration>,
    pub dry_run: bool,
    pub force: bool,
    pub leader: bool,
    pub to: Option<String>,
    pub upto: Option<String>,
    pub downto: Option<String>,
    pub disable_rollback: bool,
    pub wait: bool,
    pub watch: bool,
    pub time: Option<Duration>,
    pub destination: Option<String>,
    /// `--kw` values of the keyword verbs
    pub keywords: Vec<String>,
    /// Template of `create`
    pub from: Option<PathBuf>,
}

/// Target state declared to a daemon monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncTarget {
    pub state: String,
    pub destination: Option<String>,
}

impl AsyncTarget {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            destination: None,
        }
    }

    pub fn placed_at(node: impl Into<String>) -> Self {
        Self {
            state: "placed".to_string(),
            destination: Some(node.into()),
        }
    }
}

impl fmt::Display for AsyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.destination {
            Some(node) => write!(f, "{}@{node}", self.state),
            None => f.write_str(&self.state),
        }
    }
}

/// Object lock handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub enabled: bool,
    /// `None` uses the node's configured timeout
    pub timeout: Option<Duration>,
}

/// Convergence wait and watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub wait: bool,
    pub watch: bool,
    pub time: Duration,
}

/// One validated action invocation
#[derive(Debug, Clone)]
pub struct ActionRequest {
    action: &'static ActionSpec,
    selector: String,
    node: Option<String>,
    local: bool,
    resources: ResourceSelector,
    barrier: Option<Barrier>,
    async_target: Option<AsyncTarget>,
    lock: LockPolicy,
    run: RunOptions,
    wait: WaitPolicy,
    keywords: Vec<String>,
    from: Option<PathBuf>,
    params: RequestParams,
}

impl ActionRequest {
    /// Validate parameters for an action
    ///
    /// The async target is attached only when the verb has one and the node
    /// is part of a daemon-managed cluster (`orchestrated`).
    pub fn new(
        action: &'static ActionSpec,
        params: RequestParams,
        nodename: &str,
        orchestrated: bool,
    ) -> Result<Self, RequestError> {
        let selector = params
            .selector
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let selector = match (action.scope, selector) {
            (_, Some(s)) => s,
            (Scope::Node, None) => nodename.to_string(),
            (Scope::Object, None) => return Err(RequestError::MissingSelector(action.to_string())),
        };

        let node = params
            .node
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if node.is_some() && params.local {
            return Err(RequestError::Conflict("node", "local"));
        }

        let barrier = match (&params.to, &params.upto, &params.downto) {
            (None, None, None) => None,
            (Some(rid), None, None) => Some(Barrier::To(rid.clone())),
            (None, Some(rid), None) => Some(Barrier::UpTo(rid.clone())),
            (None, None, Some(rid)) => Some(Barrier::DownTo(rid.clone())),
            (Some(_), Some(_), _) => return Err(RequestError::Conflict("to", "upto")),
            (Some(_), None, Some(_)) => return Err(RequestError::Conflict("to", "downto")),
            (None, Some(_), Some(_)) => return Err(RequestError::Conflict("upto", "downto")),
        };

        let resources = ResourceSelector::parse(
            params.rid.as_deref(),
            params.subset.as_deref(),
            params.tag.as_deref(),
        )?;

        let target = match action.target {
            Some(TargetSpec::State(state)) => Some(AsyncTarget::new(state)),
            Some(TargetSpec::PlacedAtLocal) => Some(AsyncTarget::placed_at(nodename)),
            Some(TargetSpec::PlacedAtDestination) => match params.destination.as_deref() {
                Some(dest) if !dest.trim().is_empty() => Some(AsyncTarget::placed_at(dest.trim())),
                _ => return Err(RequestError::MissingDestination(action.to_string())),
            },
            None => None,
        };

        Ok(Self {
            action,
            selector,
            node,
            local: params.local,
            resources,
            barrier,
            async_target: target.filter(|_| orchestrated),
            lock: LockPolicy {
                enabled: !params.no_lock,
                timeout: params.lock_timeout,
            },
            run: RunOptions {
                dry_run: params.dry_run,
                disable_rollback: params.disable_rollback,
                force: params.force,
                leader: params.leader,
            },
            wait: WaitPolicy {
                wait: params.wait,
                watch: params.watch,
                time: params.time.unwrap_or(DEFAULT_WAIT),
            },
            keywords: params.keywords.clone(),
            from: params.from.clone(),
            params,
        })
    }

    pub fn action(&self) -> &'static ActionSpec {
        self.action
    }

    /// Object selector, or the node selector of a node action
    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn node_selector(&self) -> Option<&str> {
        self.node.as_deref()
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn resources(&self) -> &ResourceSelector {
        &self.resources
    }

    pub fn barrier(&self) -> Option<&Barrier> {
        self.barrier.as_ref()
    }

    pub fn async_target(&self) -> Option<&AsyncTarget> {
        self.async_target.as_ref()
    }

    pub fn lock(&self) -> LockPolicy {
        self.lock
    }

    pub fn run_options(&self) -> &RunOptions {
        &self.run
    }

    pub fn wait(&self) -> WaitPolicy {
        self.wait
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn from(&self) -> Option<&PathBuf> {
        self.from.as_ref()
    }

    /// Options sent along with the action name to a peer
    ///
    /// The peer runs the action on its own node, so `local` is forced.
    pub fn remote_options(&self) -> Value {
        let p = &self.params;
        let mut options = Map::new();
        options.insert("local".into(), json!(true));
        let mut put = |key: &str, value: Option<&String>| {
            if let Some(v) = value {
                options.insert(key.into(), json!(v));
            }
        };
        put("rid", p.rid.as_ref());
        put("subset", p.subset.as_ref());
        put("tag", p.tag.as_ref());
        put("to", p.to.as_ref());
        put("upto", p.upto.as_ref());
        put("downto", p.downto.as_ref());
        put("destination", p.destination.as_ref());
        for (key, flag) in [
            ("dry_run", p.dry_run),
            ("force", p.force),
            ("leader", p.leader),
            ("disable_rollback", p.disable_rollback),
            ("no_lock", p.no_lock),
        ] {
            if flag {
                options.insert(key.into(), json!(true));
            }
        }
        if let Some(timeout) = p.lock_timeout {
            options.insert("lock_timeout".into(), json!(format!("{}ms", timeout.as_millis())));
        }
        if !p.keywords.is_empty() {
            options.insert("kw".into(), json!(p.keywords));
        }
        Value::Object(options)
    }
}
