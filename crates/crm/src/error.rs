//! Error types for the resource action layer.

use crate::types::Verb;
use std::fmt;
use thiserror::Error;

/// Result type alias for crm operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised before any resource action runs.
///
/// These abort the action with no side effect.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A string is not a valid resource identifier
    #[error("invalid resource id: {0}")]
    InvalidRid(String),

    /// A resource selector expression is malformed
    #[error("invalid {kind} expression '{expr}': {reason}")]
    InvalidSelector {
        /// Which filter (rid, subset, tag)
        kind: &'static str,
        /// The offending expression
        expr: String,
        /// What is wrong with it
        reason: String,
    },

    /// A barrier names a resource absent from the plan
    #[error("barrier {0} is not part of the plan")]
    UnknownBarrier(String),

    /// A barrier does not apply to the verb direction
    #[error("--{barrier} can not be used with {verb}")]
    BarrierDirection {
        /// Barrier flag name
        barrier: &'static str,
        /// The verb being planned
        verb: Verb,
    },
}

/// A failed resource step.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{rid}: {verb} failed: {message}")]
pub struct StepError {
    /// The failing resource
    pub rid: String,
    /// The verb that failed
    pub verb: Verb,
    /// Driver error, with its context chain
    pub message: String,
}

impl StepError {
    pub fn new(rid: &str, verb: Verb, err: &anyhow::Error) -> Self {
        Self {
            rid: rid.to_string(),
            verb,
            message: format!("{err:#}"),
        }
    }
}

/// The failure of a run: the first forward error, plus the first rollback
/// error when rollback was attempted and itself failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    pub failed: StepError,
    pub rollback: Option<StepError>,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rollback {
            Some(rollback) => write!(f, "{}; rollback aborted: {}", self.failed, rollback),
            None => write!(f, "{}", self.failed),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.failed)
    }
}
