//! # crm
//!
//! The local control layer: applies one action verb to an object's
//! resources, in dependency order, with partial-failure recovery.
//!
//! ## Core Concepts
//!
//! - **Resource**: one declared unit of an object (ip, disk, fs, app, ...)
//! - **ResourceSelector**: rid / subset / tag filters over declared resources
//! - **ExecutionPlan**: the selected resources ordered for a verb
//! - **run**: executes a plan, rolling back completed steps on failure
//!
//! ## Example
//!
//! ```ignore
//! use crm::{ActionContext, ExecutionPlan, NoProgress, ResourceSelector, RunOptions, Verb};
//!
//! let selector = ResourceSelector::parse(Some("app,ip#1"), None, None)?;
//! let plan = ExecutionPlan::build(selector.filter(&resources), Verb::Start);
//! let report = crm::run(&plan, &RunOptions::default(), &ActionContext::default(), &mut NoProgress);
//!
//! if let Some(err) = &report.error {
//!     eprintln!("start failed: {err}");
//! }
//! ```

pub mod context;
pub mod error;
pub mod executor;
pub mod planner;
pub mod resource;
pub mod rid;
pub mod selector;
pub mod types;

// Re-export main types at crate root
pub use context::{ActionContext, NoProgress, ProgressCallback, RecordProgress};
pub use error::{Error, Result, RunError, StepError};
pub use executor::{RunReport, Step, run};
pub use planner::{Barrier, ExecutionPlan};
pub use resource::{BoxedResource, Resource};
pub use rid::Rid;
pub use selector::ResourceSelector;
pub use types::{ActionOutcome, Availability, Direction, RunOptions, StepState, Verb};
