//! Action verb table
//!
//! Each verb maps to what it does locally, the action name sent to a peer,
//! and, for verbs the daemon can orchestrate, the target state declared to
//! the monitor.

use std::fmt;

use crate::path::Capability;
use crate::path::Capability::{Enterable, Freezable, Startable};
use crm::Verb;
use LocalOp as Op;

/// What an action applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Object,
    Node,
}

/// Local execution of a verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOp {
    /// Resource plan through the action runner
    Run(Verb),
    /// Stop plan then start plan under one lock
    Restart,
    /// Unprovision plan then delete
    Purge,
    Status,
    Freeze,
    Unfreeze,
    Get,
    Eval,
    Set,
    Unset,
    Create,
    Delete,
    Logs,
    Enter,
}

impl LocalOp {
    /// Whether the op changes state and so runs under the object lock
    pub fn mutates(self) -> bool {
        !matches!(self, Self::Status | Self::Get | Self::Eval | Self::Logs | Self::Enter)
    }
}

/// How a verb's async target is formed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSpec {
    /// A fixed state name
    State(&'static str),
    /// `placed@<destination>`
    PlacedAtDestination,
    /// `placed@<this node>`
    PlacedAtLocal,
}

/// One entry of the verb table
#[derive(Debug, Clone, Copy)]
pub struct ActionSpec {
    pub name: &'static str,
    pub scope: Scope,
    pub local: Option<LocalOp>,
    /// Action name sent to a peer
    pub remote: &'static str,
    pub target: Option<TargetSpec>,
    /// Run locally even without `--local`
    pub local_first: bool,
    /// Exit code carries the result instead of printed errors
    pub silent: bool,
    pub requires: Capability,
}

impl ActionSpec {
    const fn object(name: &'static str, local: Option<LocalOp>) -> Self {
        Self {
            name,
            scope: Scope::Object,
            local,
            remote: name,
            target: None,
            local_first: false,
            silent: false,
            requires: Capability::Configurable,
        }
    }

    const fn node(name: &'static str, local: LocalOp, target: &'static str) -> Self {
        Self {
            name,
            scope: Scope::Node,
            local: Some(local),
            remote: name,
            target: Some(TargetSpec::State(target)),
            local_first: false,
            silent: false,
            requires: Capability::Configurable,
        }
    }

    const fn target(mut self, target: TargetSpec) -> Self {
        self.target = Some(target);
        self
    }

    const fn state(self, state: &'static str) -> Self {
        self.target(TargetSpec::State(state))
    }

    const fn local_first(mut self) -> Self {
        self.local_first = true;
        self
    }

    const fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    const fn requires(mut self, capability: Capability) -> Self {
        self.requires = capability;
        self
    }
}

impl fmt::Display for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Scope::Object => f.write_str(self.name),
            Scope::Node => write!(f, "node {}", self.name),
        }
    }
}

const fn run(name: &'static str, verb: Verb) -> ActionSpec {
    ActionSpec::object(name, Some(Op::Run(verb))).requires(Startable)
}

/// Object verbs
pub const OBJECT_ACTIONS: &[ActionSpec] = &[
    ActionSpec::object("create", Some(Op::Create)),
    ActionSpec::object("delete", Some(Op::Delete)).state("deleted"),
    ActionSpec::object("purge", Some(Op::Purge)).state("purged"),
    ActionSpec::object("get", Some(Op::Get)).local_first(),
    ActionSpec::object("eval", Some(Op::Eval)).local_first(),
    ActionSpec::object("set", Some(Op::Set)).local_first(),
    ActionSpec::object("unset", Some(Op::Unset)).local_first(),
    run("start", Verb::Start).state("started"),
    run("stop", Verb::Stop).state("stopped"),
    ActionSpec::object("restart", Some(Op::Restart))
        .requires(Startable)
        .state("restarted"),
    ActionSpec::object("freeze", Some(Op::Freeze))
        .requires(Freezable)
        .state("frozen"),
    ActionSpec::object("unfreeze", Some(Op::Unfreeze))
        .requires(Freezable)
        .state("thawed"),
    run("provision", Verb::Provision).state("provisioned"),
    run("unprovision", Verb::Unprovision).state("unprovisioned"),
    ActionSpec::object("switch", None)
        .requires(Startable)
        .target(TargetSpec::PlacedAtDestination),
    ActionSpec::object("takeover", None)
        .requires(Startable)
        .target(TargetSpec::PlacedAtLocal),
    ActionSpec::object("giveback", None)
        .requires(Startable)
        .state("placed"),
    ActionSpec::object("abort", None).state("aborted"),
    run("run", Verb::Run),
    run("sync_update", Verb::SyncUpdate),
    run("sync_resync", Verb::SyncResync),
    run("sync_full", Verb::SyncFull),
    run("prstart", Verb::PrStart),
    run("prstop", Verb::PrStop),
    ActionSpec::object("status", Some(Op::Status))
        .local_first()
        .silent(),
    ActionSpec::object("logs", Some(Op::Logs)),
    ActionSpec::object("enter", Some(Op::Enter))
        .requires(Enterable)
        .local_first(),
];

/// Node verbs
pub const NODE_ACTIONS: &[ActionSpec] = &[
    ActionSpec::node("freeze", Op::Freeze, "frozen"),
    ActionSpec::node("unfreeze", Op::Unfreeze, "thawed"),
    ActionSpec {
        local: None,
        ..ActionSpec::node("drain", Op::Freeze, "drained")
    },
];

pub fn object_action(name: &str) -> Option<&'static ActionSpec> {
    OBJECT_ACTIONS.iter().find(|a| a.name == name)
}

pub fn node_action(name: &str) -> Option<&'static ActionSpec> {
    NODE_ACTIONS.iter().find(|a| a.name == name)
}
