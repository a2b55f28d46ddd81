//! Target-state declaration and convergence waiting
//!
//! Declarations run one unit after the other, in selection order. A failed
//! declaration is recorded and the batch moves on. When waiting, the event
//! subscription is opened before the first declaration.

use serde_json::json;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::path::ObjectPath;
use crate::progress;
use crate::request::{ActionRequest, AsyncTarget};
use crate::results::ActionResult;
use daemonapi::watch::{NODE_LABEL, PATH_LABEL};
use daemonapi::{DaemonApi, Event, EventFilter, Expectation, Watcher};

/// Declares targets through one daemon
pub struct Orchestrator<'a> {
    api: &'a dyn DaemonApi,
    /// Node answering for the daemon, used in results
    node: &'a str,
    show_progress: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(api: &'a dyn DaemonApi, node: &'a str) -> Self {
        Self {
            api,
            node,
            show_progress: false,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Declare `target` for every object
    pub fn declare_objects(
        &self,
        paths: &[ObjectPath],
        target: &AsyncTarget,
        req: &ActionRequest,
    ) -> Vec<ActionResult> {
        let units: Vec<(Option<ObjectPath>, String)> =
            paths.iter().map(|p| (Some(p.clone()), p.fqn())).collect();
        let options = req.remote_options();
        self.declare(&units, target, req, PATH_LABEL, |unit| {
            self.api.post_object_global_expect(unit, &target.to_string(), &options)
        })
    }

    /// Declare `target` for every node
    pub fn declare_nodes(
        &self,
        nodes: &[String],
        target: &AsyncTarget,
        req: &ActionRequest,
    ) -> Vec<ActionResult> {
        let units: Vec<(Option<ObjectPath>, String)> =
            nodes.iter().map(|n| (None, n.clone())).collect();
        self.declare(&units, target, req, NODE_LABEL, |unit| {
            self.api.post_node_global_expect(unit, &target.to_string())
        })
    }

    fn declare(
        &self,
        units: &[(Option<ObjectPath>, String)],
        target: &AsyncTarget,
        req: &ActionRequest,
        label: &str,
        post: impl Fn(&str) -> daemonapi::Result<()>,
    ) -> Vec<ActionResult> {
        let expect = Expectation::global_expect();
        let watcher = if req.wait().wait {
            match self.api.events(&expect.filter()) {
                Ok(stream) => Some(Watcher::start(stream)),
                Err(e) => {
                    let err = anyhow::Error::from(e).context("could not subscribe to events");
                    return units
                        .iter()
                        .map(|(path, _)| self.failed(path.clone(), &err))
                        .collect();
                }
            }
        } else {
            None
        };

        let mut failed = Vec::new();
        let mut declared = Vec::new();
        for (i, (path, unit)) in units.iter().enumerate() {
            log::info!("{unit}: declare {target}");
            match post(unit) {
                Ok(()) => declared.push((i, path.clone(), unit.clone())),
                Err(e) => {
                    if e.category().is_transient() {
                        log::warn!("{unit}: {e} (transient, not retried)");
                    } else {
                        log::warn!("{unit}: {e}");
                    }
                    failed.push((i, self.failed(path.clone(), &e.into())));
                }
            }
        }

        let order: Vec<usize> = declared.iter().map(|(i, _, _)| *i).collect();
        let declared: Vec<(Option<ObjectPath>, String)> =
            declared.into_iter().map(|(_, p, u)| (p, u)).collect();
        let done = match watcher {
            Some(watcher) if !declared.is_empty() => {
                self.wait(&watcher, &expect, label, &declared, target, req)
            }
            _ => declared
                .into_iter()
                .map(|(path, unit)| {
                    ActionResult::ok(
                        path,
                        self.node,
                        json!({ "unit": unit, "target": target.to_string() }),
                    )
                    .with_human(format!("{unit}: target {target} declared"))
                })
                .collect(),
        };

        // back to selection order
        let mut results: Vec<(usize, ActionResult)> = order.into_iter().zip(done).collect();
        results.extend(failed);
        results.sort_by_key(|(i, _)| *i);
        results.into_iter().map(|(_, r)| r).collect()
    }

    fn wait(
        &self,
        watcher: &Watcher,
        expect: &Expectation,
        label: &str,
        declared: &[(Option<ObjectPath>, String)],
        target: &AsyncTarget,
        req: &ActionRequest,
    ) -> Vec<ActionResult> {
        let units: Vec<String> = declared.iter().map(|(_, u)| u.clone()).collect();
        let pb = if self.show_progress {
            progress::spinner(&format!("waiting for {target} on {} unit(s)", units.len()))
        } else {
            progress::hidden()
        };
        let (settled, stopped) = watcher.wait_partial(expect, label, &units, req.wait().time);
        progress::finish_clear(&pb);

        // units that settled keep their outcome; only the rest carry the wait error
        let stopped = stopped.map(anyhow::Error::from);
        declared
            .iter()
            .map(|(path, unit)| match settled.iter().find(|s| s.unit == *unit) {
                Some(s) if s.outcome.is_success() => ActionResult::ok(
                    path.clone(),
                    self.node,
                    json!({ "unit": unit, "target": target.to_string(), "event": s.event.kind }),
                )
                .with_human(format!("{unit}: {target} ({})", s.event.kind)),
                Some(s) => self.failed(path.clone(), &anyhow::anyhow!("{target}: {}", s.reason())),
                None => match &stopped {
                    Some(err) => self.failed(path.clone(), err),
                    None => self.failed(path.clone(), &anyhow::anyhow!("{unit}: no terminal event")),
                },
            })
            .collect()
    }

    fn failed(&self, path: Option<ObjectPath>, err: &anyhow::Error) -> ActionResult {
        ActionResult::failed(path, self.node, err)
    }
}

/// Follow events for `units` on a background thread until `time` passes
///
/// The subscription is opened before returning, so nothing emitted after
/// the call is missed.
pub fn spawn_watch(
    api: &dyn DaemonApi,
    label: &'static str,
    units: Vec<String>,
    time: Duration,
    on_event: impl Fn(&Event) + Send + 'static,
) -> daemonapi::Result<JoinHandle<usize>> {
    let stream = api.events(&EventFilter::new())?;
    Ok(std::thread::spawn(move || {
        let watcher = Watcher::start(stream);
        let seen = watcher.follow(time, |event| {
            if event
                .label_value(label)
                .is_some_and(|u| units.iter().any(|x| x == u))
            {
                on_event(event);
            }
        });
        match seen {
            Ok(n) => n,
            Err(e) => {
                log::warn!("watch: {e}");
                0
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{node_action, object_action};
    use crate::request::RequestParams;
    use daemonapi::{Call, MockDaemon};
    use std::sync::{Arc, Mutex};

    fn request(verb: &str, wait: bool) -> ActionRequest {
        let params = RequestParams {
            selector: Some("**".into()),
            wait,
            time: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        ActionRequest::new(object_action(verb).unwrap(), params, "n1", true).unwrap()
    }

    fn paths(list: &[&str]) -> Vec<ObjectPath> {
        list.iter().map(|p| ObjectPath::parse(p).unwrap()).collect()
    }

    #[test]
    fn test_declare_continues_past_failures() {
        let mock = MockDaemon::new().failing("root/svc/b");
        let req = request("start", false);
        let target = req.async_target().unwrap().clone();
        let results = Orchestrator::new(&mock, "n1").declare_objects(&paths(&["a", "b", "c"]), &target, &req);

        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
        assert!(!results[1].is_ok());
        assert_eq!(results[1].path.as_ref().unwrap().to_string(), "b");

        let declared: Vec<String> = mock
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::ObjectGlobalExpect { path, target } => Some(format!("{path}={target}")),
                _ => None,
            })
            .collect();
        assert_eq!(
            declared,
            ["root/svc/a=started", "root/svc/b=started", "root/svc/c=started"]
        );
    }

    #[test]
    fn test_wait_for_convergence() {
        let mock = MockDaemon::new().replying("GlobalExpectReached");
        let req = request("stop", true);
        let target = req.async_target().unwrap().clone();
        let results = Orchestrator::new(&mock, "n1").declare_objects(&paths(&["a", "ns1/svc/b"]), &target, &req);
        assert!(results.iter().all(ActionResult::is_ok), "{results:?}");
        assert_eq!(results[1].data["event"], "GlobalExpectReached");
        // subscription opened before any declaration
        assert!(matches!(mock.calls()[0], Call::Events(_)));
    }

    #[test]
    fn test_wait_reports_failed_convergence() {
        let mock = MockDaemon::new().replying("GlobalExpectFailed");
        let req = request("freeze", true);
        let target = req.async_target().unwrap().clone();
        let results = Orchestrator::new(&mock, "n1").declare_objects(&paths(&["a"]), &target, &req);
        assert_eq!(results[0].error.as_deref(), Some("frozen: GlobalExpectFailed"));
    }

    #[test]
    fn test_wait_timeout_is_not_an_action_failure() {
        let mock = MockDaemon::new();
        let req = request("start", true);
        let target = req.async_target().unwrap().clone();
        let results = Orchestrator::new(&mock, "n1").declare_objects(&paths(&["a"]), &target, &req);
        let err = results[0].error.as_deref().unwrap();
        assert!(err.contains("did not observe the expected terminal event"), "{err}");
    }

    #[test]
    fn test_wait_timeout_spares_converged_units() {
        let mock = MockDaemon::new();
        mock.push_event(Event::new("GlobalExpectReached").label(PATH_LABEL, "root/svc/a"));
        let req = request("start", true);
        let target = req.async_target().unwrap().clone();
        let results = Orchestrator::new(&mock, "n1").declare_objects(&paths(&["a", "b"]), &target, &req);

        assert!(results[0].is_ok(), "{results:?}");
        assert_eq!(results[0].data["event"], "GlobalExpectReached");
        let err = results[1].error.as_deref().unwrap();
        assert!(err.contains("did not observe the expected terminal event"), "{err}");
        assert!(err.contains("root/svc/b") && !err.contains("root/svc/a"), "{err}");
    }

    #[test]
    fn test_declare_nodes() {
        let mock = MockDaemon::new().replying("GlobalExpectUnchanged");
        let params = RequestParams {
            wait: true,
            time: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let req = ActionRequest::new(node_action("freeze").unwrap(), params, "n1", true).unwrap();
        let target = req.async_target().unwrap().clone();
        let results = Orchestrator::new(&mock, "n1").declare_nodes(&["n1".to_string()], &target, &req);
        assert!(results[0].is_ok());
        assert!(results[0].path.is_none());
    }

    #[test]
    fn test_spawn_watch_filters_units() {
        let mock = MockDaemon::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = spawn_watch(
            &mock,
            PATH_LABEL,
            vec!["root/svc/a".into()],
            Duration::from_millis(500),
            move |e| sink.lock().unwrap().push(e.kind.clone()),
        )
        .unwrap();
        mock.push_event(Event::new("ObjectStatusUpdated").label("path", "root/svc/b"));
        mock.push_event(Event::new("ObjectStatusUpdated").label("path", "root/svc/a"));
        assert_eq!(handle.join().unwrap(), 2);
        assert_eq!(*seen.lock().unwrap(), ["ObjectStatusUpdated"]);
    }
}
