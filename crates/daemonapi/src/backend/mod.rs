//! Daemon client trait and implementations.
//!
//! [`DaemonApi`] is the seam between the agent and a running daemon. The
//! production implementation is [`http::HttpDaemon`]; [`MockDaemon`] keeps
//! everything in memory for tests.
//!
//! # Testing
//!
//! ```
//! use daemonapi::backend::{DaemonApi, MockDaemon};
//!
//! let mock = MockDaemon::new().with_paths(&["root/svc/web", "ns1/vol/data"]);
//! assert_eq!(mock.object_paths("**").unwrap().len(), 2);
//! ```

pub mod http;

use crate::error::{Error, Result};
use crate::types::{Event, EventFilter, JoinBundle};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Stream of events from one subscription.
///
/// Reading blocks until the next event arrives; `None` means the daemon
/// closed the feed.
pub type EventStream = Box<dyn Iterator<Item = Result<Event>> + Send>;

/// Client operations against one daemon.
pub trait DaemonApi: Send + Sync {
    /// Base URL or label of the daemon, for messages.
    fn endpoint(&self) -> &str;

    /// Check the daemon answers.
    fn ping(&self) -> Result<()>;

    /// Fully-qualified paths of the objects matching a selector.
    fn object_paths(&self, selector: &str) -> Result<Vec<String>>;

    /// Cluster member names.
    fn node_names(&self) -> Result<Vec<String>>;

    /// Run an object action synchronously on the daemon's node.
    ///
    /// The peer's result is returned verbatim.
    fn post_object_action(&self, path: &str, action: &str, options: &Value) -> Result<Value>;

    /// Run a node action synchronously on the daemon's node.
    fn post_node_action(&self, action: &str, options: &Value) -> Result<Value>;

    /// Declare an object's target state.
    fn post_object_global_expect(&self, path: &str, target: &str, options: &Value) -> Result<()>;

    /// Declare a node's target state.
    fn post_node_global_expect(&self, node: &str, target: &str) -> Result<()>;

    /// Open an event subscription.
    fn events(&self, filter: &EventFilter) -> Result<EventStream>;

    /// Ask the daemon to exit.
    fn post_daemon_stop(&self) -> Result<()>;

    /// Ask the cluster to release this node.
    fn post_node_leave(&self) -> Result<()>;

    /// Fetch the files a joining node installs.
    fn fetch_join_bundle(&self, token: &str) -> Result<JoinBundle>;
}

/// A request recorded by [`MockDaemon`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// `ping`
    Ping,
    /// `object_paths`
    ObjectPaths(String),
    /// `node_names`
    NodeNames,
    /// `post_object_action`
    ObjectAction {
        /// Object path.
        path: String,
        /// Action name.
        action: String,
        /// Action options.
        options: Value,
    },
    /// `post_node_action`
    NodeAction {
        /// Action name.
        action: String,
        /// Action options.
        options: Value,
    },
    /// `post_object_global_expect`
    ObjectGlobalExpect {
        /// Object path.
        path: String,
        /// Target state.
        target: String,
    },
    /// `post_node_global_expect`
    NodeGlobalExpect {
        /// Node name.
        node: String,
        /// Target state.
        target: String,
    },
    /// `events`
    Events(EventFilter),
    /// `post_daemon_stop`
    DaemonStop,
    /// `post_node_leave`
    NodeLeave,
    /// `fetch_join_bundle`
    Join(String),
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<Call>,
    paths: Vec<String>,
    nodes: Vec<String>,
    unreachable: bool,
    failing: HashSet<String>,
    feed: Vec<Event>,
    reply: Option<String>,
    leave_reply: Option<String>,
    bundle: Option<JoinBundle>,
}

/// In-memory daemon for tests.
///
/// Clones share state, so a test can keep a handle while the code under
/// test owns a boxed copy.
#[derive(Debug, Clone, Default)]
pub struct MockDaemon {
    label: String,
    state: Arc<(Mutex<MockState>, Condvar)>,
}

/// How long a mock event stream waits for a new event before closing.
const MOCK_STREAM_IDLE: Duration = Duration::from_secs(2);

impl MockDaemon {
    /// Create a reachable mock with an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            label: "mock://daemon".to_string(),
            ..Self::default()
        }
    }

    /// Name the mock, e.g. after the node it stands for.
    #[must_use]
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the object inventory (fully-qualified paths).
    #[must_use]
    pub fn with_paths(self, paths: &[&str]) -> Self {
        self.state().paths = paths.iter().map(ToString::to_string).collect();
        self
    }

    /// Set the cluster node list.
    #[must_use]
    pub fn with_nodes(self, nodes: &[&str]) -> Self {
        self.state().nodes = nodes.iter().map(ToString::to_string).collect();
        self
    }

    /// Emit an event of `kind` for every declared target, labeled with the
    /// unit (`path=` or `node=`).
    #[must_use]
    pub fn replying(self, kind: &str) -> Self {
        self.state().reply = Some(kind.to_string());
        self
    }

    /// Emit an event of `kind` labeled `node=<label>` when a leave is posted.
    #[must_use]
    pub fn replying_to_leave(self, kind: &str) -> Self {
        self.state().leave_reply = Some(kind.to_string());
        self
    }

    /// Set the join bundle served for any token.
    #[must_use]
    pub fn with_join_bundle(self, bundle: JoinBundle) -> Self {
        self.state().bundle = Some(bundle);
        self
    }

    /// Make every call fail with a transport error.
    #[must_use]
    pub fn unreachable(self) -> Self {
        self.state().unreachable = true;
        self
    }

    /// Make calls naming this object path or node fail with HTTP 500.
    #[must_use]
    pub fn failing(self, unit: &str) -> Self {
        self.state().failing.insert(unit.to_string());
        self
    }

    /// Append an event to the feed every subscription reads.
    pub fn push_event(&self, event: Event) {
        let (lock, cvar) = &*self.state;
        lock.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .feed
            .push(event);
        cvar.notify_all();
    }

    /// Requests received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: Call, unit: Option<&str>) -> Result<()> {
        let mut state = self.state();
        state.calls.push(call);
        if state.unreachable {
            return Err(Error::Transport {
                url: self.label.clone(),
                message: "connection refused".to_string(),
            });
        }
        if unit.is_some_and(|u| state.failing.contains(u)) {
            return Err(Error::Status {
                url: self.label.clone(),
                status: 500,
            });
        }
        Ok(())
    }
}

impl DaemonApi for MockDaemon {
    fn endpoint(&self) -> &str {
        &self.label
    }

    fn ping(&self) -> Result<()> {
        self.record(Call::Ping, None)
    }

    fn object_paths(&self, selector: &str) -> Result<Vec<String>> {
        self.record(Call::ObjectPaths(selector.to_string()), None)?;
        Ok(self.state().paths.clone())
    }

    fn node_names(&self) -> Result<Vec<String>> {
        self.record(Call::NodeNames, None)?;
        Ok(self.state().nodes.clone())
    }

    fn post_object_action(&self, path: &str, action: &str, options: &Value) -> Result<Value> {
        let call = Call::ObjectAction {
            path: path.to_string(),
            action: action.to_string(),
            options: options.clone(),
        };
        self.record(call, Some(path))?;
        Ok(json!({ "path": path, "action": action, "node": self.label }))
    }

    fn post_node_action(&self, action: &str, options: &Value) -> Result<Value> {
        let call = Call::NodeAction {
            action: action.to_string(),
            options: options.clone(),
        };
        self.record(call, Some(&self.label))?;
        Ok(json!({ "action": action, "node": self.label }))
    }

    fn post_object_global_expect(&self, path: &str, target: &str, _options: &Value) -> Result<()> {
        let call = Call::ObjectGlobalExpect {
            path: path.to_string(),
            target: target.to_string(),
        };
        self.record(call, Some(path))?;
        let reply = self.state().reply.clone();
        if let Some(kind) = reply {
            self.push_event(Event::new(kind).label("path", path));
        }
        Ok(())
    }

    fn post_node_global_expect(&self, node: &str, target: &str) -> Result<()> {
        let call = Call::NodeGlobalExpect {
            node: node.to_string(),
            target: target.to_string(),
        };
        self.record(call, Some(node))?;
        let reply = self.state().reply.clone();
        if let Some(kind) = reply {
            self.push_event(Event::new(kind).label("node", node));
        }
        Ok(())
    }

    fn events(&self, filter: &EventFilter) -> Result<EventStream> {
        self.record(Call::Events(filter.clone()), None)?;
        Ok(Box::new(MockStream {
            state: Arc::clone(&self.state),
            filter: filter.clone(),
            cursor: 0,
        }))
    }

    fn post_daemon_stop(&self) -> Result<()> {
        self.record(Call::DaemonStop, None)
    }

    fn post_node_leave(&self) -> Result<()> {
        self.record(Call::NodeLeave, Some(&self.label))?;
        let reply = self.state().leave_reply.clone();
        if let Some(kind) = reply {
            self.push_event(Event::new(kind).label("node", self.label.as_str()));
        }
        Ok(())
    }

    fn fetch_join_bundle(&self, token: &str) -> Result<JoinBundle> {
        self.record(Call::Join(token.to_string()), None)?;
        self.state().bundle.clone().ok_or(Error::Status {
            url: self.label.clone(),
            status: 403,
        })
    }
}

/// Subscription reading the mock's feed from the first event.
///
/// Each subscription keeps its own position, so subscribers do not take
/// events from one another.
struct MockStream {
    state: Arc<(Mutex<MockState>, Condvar)>,
    filter: EventFilter,
    cursor: usize,
}

impl Iterator for MockStream {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        let (lock, cvar) = &*self.state;
        let deadline = Instant::now() + MOCK_STREAM_IDLE;
        let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            while let Some(event) = state.feed.get(self.cursor) {
                self.cursor += 1;
                if self.filter.accepts(event) {
                    return Some(Ok(event.clone()));
                }
            }
            let left = deadline.checked_duration_since(Instant::now())?;
            state = cvar
                .wait_timeout(state, left)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_calls() {
        let mock = MockDaemon::new().with_nodes(&["n1", "n2"]);
        assert_eq!(mock.node_names().unwrap(), ["n1", "n2"]);
        mock.post_object_global_expect("root/svc/s1", "started", &Value::Null)
            .unwrap();
        assert_eq!(
            mock.calls(),
            [
                Call::NodeNames,
                Call::ObjectGlobalExpect {
                    path: "root/svc/s1".into(),
                    target: "started".into()
                }
            ]
        );
    }

    #[test]
    fn test_mock_failures() {
        let mock = MockDaemon::new().failing("root/svc/bad");
        assert!(
            mock.post_object_action("root/svc/ok", "start", &Value::Null)
                .is_ok()
        );
        let err = mock
            .post_object_action("root/svc/bad", "start", &Value::Null)
            .unwrap_err();
        assert!(matches!(err, Error::Status { status: 500, .. }));

        let down = MockDaemon::new().unreachable();
        assert!(matches!(down.ping(), Err(Error::Transport { .. })));
    }

    #[test]
    fn test_mock_stream_delivers_replies() {
        let mock = MockDaemon::new().replying("GlobalExpectReached");
        let mut stream = mock.events(&EventFilter::new().kind("GlobalExpectReached")).unwrap();
        mock.post_object_global_expect("ns1/svc/s1", "started", &Value::Null)
            .unwrap();
        let ev = stream.next().unwrap().unwrap();
        assert_eq!(ev.label_value("path"), Some("ns1/svc/s1"));
    }

    #[test]
    fn test_subscriptions_read_independently() {
        let mock = MockDaemon::new();
        let mut first = mock.events(&EventFilter::new()).unwrap();
        let mut second = mock.events(&EventFilter::new().kind("LeaveSuccess")).unwrap();
        mock.push_event(Event::new("Other"));
        mock.push_event(Event::new("LeaveSuccess"));

        assert_eq!(first.next().unwrap().unwrap().kind, "Other");
        assert_eq!(second.next().unwrap().unwrap().kind, "LeaveSuccess");
        assert_eq!(first.next().unwrap().unwrap().kind, "LeaveSuccess");
    }

    #[test]
    fn test_mock_stream_skips_filtered_events() {
        let mock = MockDaemon::new();
        mock.push_event(Event::new("Other"));
        mock.push_event(Event::new("LeaveSuccess"));
        let mut stream = mock.events(&EventFilter::new().kind("LeaveSuccess")).unwrap();
        assert_eq!(stream.next().unwrap().unwrap().kind, "LeaveSuccess");
    }
}
