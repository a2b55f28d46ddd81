//! Core types for resource actions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction a verb walks the resource sequence in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Ascending sequence numbers (start, provision, ...)
    Forward,
    /// Descending sequence numbers (stop, unprovision, ...)
    Backward,
}

/// A resource-level action verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Start,
    Stop,
    Provision,
    Unprovision,
    PrStart,
    PrStop,
    Run,
    SyncUpdate,
    SyncResync,
    SyncFull,
}

impl Verb {
    /// All verbs, in a stable order
    pub const ALL: [Verb; 10] = [
        Verb::Start,
        Verb::Stop,
        Verb::Provision,
        Verb::Unprovision,
        Verb::PrStart,
        Verb::PrStop,
        Verb::Run,
        Verb::SyncUpdate,
        Verb::SyncResync,
        Verb::SyncFull,
    ];

    /// Keyword name of the verb, as used in resource configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Provision => "provision",
            Self::Unprovision => "unprovision",
            Self::PrStart => "prstart",
            Self::PrStop => "prstop",
            Self::Run => "run",
            Self::SyncUpdate => "sync_update",
            Self::SyncResync => "sync_resync",
            Self::SyncFull => "sync_full",
        }
    }

    /// Which way the plan is ordered for this verb
    pub fn direction(&self) -> Direction {
        match self {
            Self::Stop | Self::Unprovision | Self::PrStop => Direction::Backward,
            _ => Direction::Forward,
        }
    }

    /// The verb undoing this one during rollback, if any
    pub fn rollback(&self) -> Option<Verb> {
        match self {
            Self::Start => Some(Self::Stop),
            Self::Provision => Some(Self::Unprovision),
            Self::PrStart => Some(Self::PrStop),
            _ => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("unknown resource verb: {s}"))
    }
}

/// Outcome of a single resource action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    /// The driver performed the action
    Done { detail: Option<String> },
    /// Nothing to do (undefined action, dry run, ...)
    Skipped { reason: String },
}

impl ActionOutcome {
    pub fn done() -> Self {
        Self::Done { detail: None }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

/// Per-step state in a run
///
/// Transitions: `Pending → Running → Succeeded | Failed | Skipped`, and for
/// succeeded steps of a failed run `RollingBack → RolledBack | RollbackFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    RollingBack,
    RolledBack,
    RollbackFailed,
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::RollingBack => "rolling back",
            Self::RolledBack => "rolled back",
            Self::RollbackFailed => "rollback failed",
        };
        f.write_str(s)
    }
}

/// Status reported by a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Up,
    Down,
    Warn,
    #[serde(rename = "n/a")]
    NotApplicable,
    Undef,
}

impl Availability {
    /// Aggregate resource availabilities into an object availability
    ///
    /// `n/a` entries are ignored; all up is up, all down is down, any other
    /// mix is warn, and nothing left is `n/a`.
    pub fn aggregate<I: IntoIterator<Item = Availability>>(items: I) -> Self {
        let mut result: Option<Availability> = None;
        for item in items {
            if item == Self::NotApplicable {
                continue;
            }
            result = Some(match (result, item) {
                (None, a) => a,
                (Some(Self::Up), Self::Up) => Self::Up,
                (Some(Self::Down), Self::Down) => Self::Down,
                _ => Self::Warn,
            });
        }
        result.unwrap_or(Self::NotApplicable)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Warn => "warn",
            Self::NotApplicable => "n/a",
            Self::Undef => "undef",
        };
        f.write_str(s)
    }
}

/// Options for a run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Report what would happen, change nothing
    pub dry_run: bool,
    /// Leave succeeded steps in place when a later step fails
    pub disable_rollback: bool,
    /// Passed through to drivers
    pub force: bool,
    /// Passed through to drivers
    pub leader: bool,
}
