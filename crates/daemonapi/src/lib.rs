//! # daemonapi
//!
//! Client side of the cluster daemon API.
//!
//! This crate provides:
//! - The [`DaemonApi`] trait and its HTTP implementation
//! - Target-state declaration (`global_expect`) for objects and nodes
//! - Event subscriptions and convergence waiting ([`watch`])
//! - A bounded poller for daemon lifecycle checks ([`poll`])
//!
//! ## Example
//!
//! ```no_run
//! use daemonapi::{DaemonApi, Expectation, HttpDaemon, Watcher, watch};
//! use std::time::Duration;
//!
//! let daemon = HttpDaemon::new("https://n1:1215");
//! let expect = Expectation::global_expect();
//!
//! // subscribe first, then declare
//! let watcher = Watcher::start(daemon.events(&expect.filter()).unwrap());
//! daemon
//!     .post_object_global_expect("root/svc/web", "started", &serde_json::Value::Null)
//!     .unwrap();
//!
//! let settled = watcher
//!     .wait(&expect, watch::PATH_LABEL, &["root/svc/web".to_string()], Duration::from_secs(60))
//!     .unwrap();
//! println!("{}: {:?}", settled[0].unit, settled[0].outcome);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod poll;
pub mod types;
pub mod watch;

pub use backend::http::HttpDaemon;
pub use backend::{Call, DaemonApi, EventStream, MockDaemon};
pub use error::{Error, ErrorCategory, Result};
pub use types::{Event, EventFilter, JoinBundle};
pub use watch::{Expectation, Settled, Terminal, Watcher};

/// Default daemon port.
pub const DEFAULT_PORT: u16 = 1215;
