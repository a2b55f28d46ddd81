//! Resource trait for object resources
//!
//! A Resource is one declared unit of an object (ip, disk, fs, app, ...)
//! with its own lifecycle actions. The crm layer never knows what an action
//! means for a given driver; it only selects, orders and sequences calls.

use crate::context::ActionContext;
use crate::rid;
use crate::types::{ActionOutcome, Availability, Verb};
use anyhow::Result;
use std::fmt;

/// Core trait for object resources
///
/// # Example
///
/// ```ignore
/// use crm::{ActionContext, ActionOutcome, Resource, Verb};
///
/// #[derive(Debug)]
/// struct Flag { rid: String, path: std::path::PathBuf }
///
/// impl Resource for Flag {
///     fn rid(&self) -> &str { &self.rid }
///
///     fn action(&self, verb: Verb, ctx: &mut ActionContext) -> anyhow::Result<ActionOutcome> {
///         if ctx.dry_run {
///             return Ok(ActionOutcome::skipped("dry run"));
///         }
///         match verb {
///             Verb::Start => std::fs::write(&self.path, b"")?,
///             Verb::Stop => std::fs::remove_file(&self.path)?,
///             _ => return Ok(ActionOutcome::skipped("not implemented")),
///         }
///         Ok(ActionOutcome::done())
///     }
/// }
/// ```
pub trait Resource: Send + Sync + fmt::Debug {
    /// Resource identifier, unique within the object
    fn rid(&self) -> &str;

    /// Driver group, derived from the RID
    fn driver_group(&self) -> &str {
        rid::group_of(self.rid())
    }

    /// Human-readable description
    fn description(&self) -> String {
        self.rid().to_string()
    }

    /// Explicit sequence number, if declared
    fn seq(&self) -> Option<i64> {
        None
    }

    /// Subset the resource belongs to
    fn subset(&self) -> Option<&str> {
        None
    }

    /// Tags declared on the resource
    fn tags(&self) -> &[String] {
        &[]
    }

    /// Driver-specific attribute lookup, for `group.attr=value` filters
    fn attr(&self, _name: &str) -> Option<String> {
        None
    }

    /// Optional resources never fail a run
    fn is_optional(&self) -> bool {
        false
    }

    /// Disabled resources are excluded from every selection
    fn is_disabled(&self) -> bool {
        false
    }

    /// Current availability of the resource
    fn status(&self, _ctx: &ActionContext) -> Result<Availability> {
        Ok(Availability::NotApplicable)
    }

    /// Run one action verb
    ///
    /// Return `Skipped` when the action is not declared for this resource.
    fn action(&self, verb: Verb, ctx: &mut ActionContext) -> Result<ActionOutcome>;
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn Resource>;
