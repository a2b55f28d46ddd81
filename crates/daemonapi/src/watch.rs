//! Waiting for convergence on the event feed.
//!
//! A [`Watcher`] owns one subscription. It is opened before the target
//! states are declared so no terminal event can slip past, then
//! [`Watcher::wait`] consumes events until every awaited unit settled or
//! the deadline passed.
//!
//! The subscription is read on a dedicated thread and handed over through
//! a channel, so the deadline holds even while the daemon sends nothing.
//! The reader thread exits when the feed closes or the watcher is dropped
//! and the next event arrives.

use crate::backend::EventStream;
use crate::error::{Error, Result};
use crate::types::{Event, EventFilter};
use std::collections::BTreeSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Label carrying the object path on object events.
pub const PATH_LABEL: &str = "path";
/// Label carrying the node name on node events.
pub const NODE_LABEL: &str = "node";

/// Outcome an event kind stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// The awaited condition was reached.
    Success,
    /// The daemon gave up on the awaited condition.
    Error,
    /// Nothing to do; counts as success.
    Ignored,
}

impl Terminal {
    /// Whether the outcome counts as success.
    #[must_use]
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Error)
    }
}

/// Mapping from event kinds to terminal outcomes for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    kinds: Vec<(String, Terminal)>,
}

impl Expectation {
    /// Build from explicit `(kind, outcome)` pairs.
    #[must_use]
    pub fn new(kinds: &[(&str, Terminal)]) -> Self {
        Self {
            kinds: kinds.iter().map(|(k, t)| ((*k).to_string(), *t)).collect(),
        }
    }

    /// Events ending a node leave.
    #[must_use]
    pub fn leave() -> Self {
        Self::new(&[
            ("LeaveSuccess", Terminal::Success),
            ("LeaveError", Terminal::Error),
            ("LeaveIgnored", Terminal::Ignored),
        ])
    }

    /// Events ending a global-expect declaration.
    #[must_use]
    pub fn global_expect() -> Self {
        Self::new(&[
            ("GlobalExpectReached", Terminal::Success),
            ("GlobalExpectFailed", Terminal::Error),
            ("GlobalExpectUnchanged", Terminal::Ignored),
        ])
    }

    /// Outcome for an event kind, `None` when the kind is not terminal.
    #[must_use]
    pub fn terminal(&self, kind: &str) -> Option<Terminal> {
        self.kinds.iter().find(|(k, _)| k == kind).map(|(_, t)| *t)
    }

    /// Subscription filter accepting exactly the terminal kinds.
    #[must_use]
    pub fn filter(&self) -> EventFilter {
        self.kinds
            .iter()
            .fold(EventFilter::new(), |f, (k, _)| f.kind(k.clone()))
    }
}

/// One unit's terminal event.
#[derive(Debug, Clone, PartialEq)]
pub struct Settled {
    /// The unit (object path or node name).
    pub unit: String,
    /// What the event means.
    pub outcome: Terminal,
    /// The event itself.
    pub event: Event,
}

impl Settled {
    /// Human-readable reason carried by an error event.
    #[must_use]
    pub fn reason(&self) -> String {
        self.event
            .data
            .get("error")
            .and_then(|v| v.as_str())
            .map_or_else(|| self.event.kind.clone(), ToString::to_string)
    }
}

/// A live event subscription.
pub struct Watcher {
    rx: Receiver<Result<Event>>,
}

impl Watcher {
    /// Start reading a subscription in the background.
    #[must_use]
    pub fn start(stream: EventStream) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for item in stream {
                if tx.send(item).is_err() {
                    break;
                }
            }
        });
        Self { rx }
    }

    /// Wait for a terminal event for each unit.
    ///
    /// `label` names the event label identifying a unit. Terminal events for
    /// other units, and repeated events for a unit already settled, are
    /// ignored. A non-terminal kind is an error.
    pub fn wait(
        &self,
        expectation: &Expectation,
        label: &str,
        units: &[String],
        timeout: Duration,
    ) -> Result<Vec<Settled>> {
        match self.wait_partial(expectation, label, units, timeout) {
            (settled, None) => Ok(settled),
            (_, Some(err)) => Err(err),
        }
    }

    /// Like [`Watcher::wait`], but keeps the units that settled when the
    /// wait ends early.
    ///
    /// The error, if any, says why the remaining units did not settle.
    /// Settled units come back in `units` order either way.
    pub fn wait_partial(
        &self,
        expectation: &Expectation,
        label: &str,
        units: &[String],
        timeout: Duration,
    ) -> (Vec<Settled>, Option<Error>) {
        let deadline = Instant::now() + timeout;
        let mut pending: BTreeSet<&str> = units.iter().map(String::as_str).collect();
        let mut settled: Vec<Settled> = Vec::with_capacity(units.len());
        let mut stopped = None;

        while !pending.is_empty() {
            let pending_list = || pending.iter().map(ToString::to_string).collect();
            let Some(left) = deadline.checked_duration_since(Instant::now()) else {
                stopped = Some(Error::Timeout {
                    timeout,
                    pending: pending_list(),
                });
                break;
            };
            let event = match self.rx.recv_timeout(left) {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => {
                    stopped = Some(e);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    stopped = Some(Error::Timeout {
                        timeout,
                        pending: pending_list(),
                    });
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    stopped = Some(Error::StreamClosed {
                        pending: pending_list(),
                    });
                    break;
                }
            };
            let Some(outcome) = expectation.terminal(&event.kind) else {
                stopped = Some(Error::UnexpectedEvent { kind: event.kind });
                break;
            };
            let Some(unit) = event.label_value(label).map(ToString::to_string) else {
                continue;
            };
            if pending.remove(unit.as_str()) {
                log::debug!("{unit}: {}", event.kind);
                settled.push(Settled {
                    unit,
                    outcome,
                    event,
                });
            }
        }

        settled.sort_by_key(|s| units.iter().position(|u| *u == s.unit));
        (settled, stopped)
    }

    /// Hand every event to `on_event` until the deadline or the feed closes.
    ///
    /// Returns the number of events seen.
    pub fn follow(&self, timeout: Duration, mut on_event: impl FnMut(&Event)) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut seen = 0;
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match self.rx.recv_timeout(left) {
                Ok(item) => {
                    on_event(&item?);
                    seen += 1;
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DaemonApi, MockDaemon};
    use serde_json::{Value, json};

    fn units(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_expectation_maps_each_kind_once() {
        let leave = Expectation::leave();
        assert_eq!(leave.terminal("LeaveSuccess"), Some(Terminal::Success));
        assert_eq!(leave.terminal("LeaveError"), Some(Terminal::Error));
        assert_eq!(leave.terminal("LeaveIgnored"), Some(Terminal::Ignored));
        assert_eq!(leave.terminal("GlobalExpectReached"), None);
        assert!(Terminal::Ignored.is_success());
        assert_eq!(leave.filter().kinds.len(), 3);
    }

    #[test]
    fn test_wait_settles_every_unit() {
        let mock = MockDaemon::new().replying("GlobalExpectReached");
        let expect = Expectation::global_expect();
        let watcher = Watcher::start(mock.events(&expect.filter()).unwrap());

        for path in ["root/svc/b", "root/svc/a"] {
            mock.post_object_global_expect(path, "started", &Value::Null)
                .unwrap();
        }
        let settled = watcher
            .wait(
                &expect,
                PATH_LABEL,
                &units(&["root/svc/a", "root/svc/b"]),
                Duration::from_secs(5),
            )
            .unwrap();
        let got: Vec<_> = settled.iter().map(|s| s.unit.as_str()).collect();
        assert_eq!(got, ["root/svc/a", "root/svc/b"]);
        assert!(settled.iter().all(|s| s.outcome == Terminal::Success));
    }

    #[test]
    fn test_wait_ignores_duplicates_and_reports_errors() {
        let mock = MockDaemon::new();
        let expect = Expectation::global_expect();
        let watcher = Watcher::start(mock.events(&expect.filter()).unwrap());

        mock.push_event(Event::new("GlobalExpectUnchanged").label("path", "s1"));
        mock.push_event(Event::new("GlobalExpectFailed").label("path", "s1"));
        mock.push_event(
            Event::new("GlobalExpectFailed")
                .label("path", "s2")
                .data(json!({"error": "no candidate node"})),
        );

        let settled = watcher
            .wait(&expect, PATH_LABEL, &units(&["s1", "s2"]), Duration::from_secs(5))
            .unwrap();
        assert_eq!(settled[0].outcome, Terminal::Ignored);
        assert_eq!(settled[1].outcome, Terminal::Error);
        assert_eq!(settled[1].reason(), "no candidate node");
    }

    #[test]
    fn test_wait_times_out() {
        let mock = MockDaemon::new();
        let expect = Expectation::leave();
        let watcher = Watcher::start(mock.events(&expect.filter()).unwrap());

        let err = watcher
            .wait(&expect, NODE_LABEL, &units(&["n1"]), Duration::from_millis(100))
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, Error::Timeout { ref pending, .. } if pending == &["n1"]));
    }

    #[test]
    fn test_wait_partial_keeps_settled_units() {
        let mock = MockDaemon::new();
        let expect = Expectation::global_expect();
        let watcher = Watcher::start(mock.events(&expect.filter()).unwrap());
        mock.push_event(Event::new("GlobalExpectReached").label("path", "root/svc/a"));

        let (settled, err) = watcher.wait_partial(
            &expect,
            PATH_LABEL,
            &units(&["root/svc/a", "root/svc/b"]),
            Duration::from_millis(200),
        );
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].unit, "root/svc/a");
        assert!(matches!(err, Some(Error::Timeout { ref pending, .. }) if pending == &["root/svc/b"]));
    }

    #[test]
    fn test_wait_rejects_unexpected_kind() {
        let events: Vec<Result<Event>> = vec![Ok(Event::new("NodeStatusUpdated").label("node", "n1"))];
        let watcher = Watcher::start(Box::new(events.into_iter()));
        let err = watcher
            .wait(
                &Expectation::leave(),
                NODE_LABEL,
                &units(&["n1"]),
                Duration::from_secs(5),
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedEvent { kind } if kind == "NodeStatusUpdated"));
    }

    #[test]
    fn test_wait_stream_closed() {
        let events: Vec<Result<Event>> = vec![];
        let watcher = Watcher::start(Box::new(events.into_iter()));
        let err = watcher
            .wait(
                &Expectation::leave(),
                NODE_LABEL,
                &units(&["n1"]),
                Duration::from_secs(5),
            )
            .unwrap_err();
        assert!(matches!(err, Error::StreamClosed { .. }));
    }

    #[test]
    fn test_follow_counts_events() {
        let events: Vec<Result<Event>> = vec![Ok(Event::new("A")), Ok(Event::new("B"))];
        let watcher = Watcher::start(Box::new(events.into_iter()));
        let mut kinds = Vec::new();
        let seen = watcher
            .follow(Duration::from_secs(5), |ev| kinds.push(ev.kind.clone()))
            .unwrap();
        assert_eq!(seen, 2);
        assert_eq!(kinds, ["A", "B"]);
    }
}
