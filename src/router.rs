//! Action routing
//!
//! The route is chosen in a fixed order, first match wins:
//!
//! 1. a node selector: synchronous run on the named peers
//! 2. `--local`, or a local-first verb: this node's objects
//! 3. an async target: declare it to the daemon
//! 4. no cluster context: this node's objects
//! 5. otherwise the ambient daemon context: a synchronous run of the verb
//!    through the local daemon, which places it on the right node. This is
//!    the Local route carried over the daemon API, not a fourth kind of
//!    execution.
//!
//! `--watch` then follows the selected units' events on a background
//! thread while the command finishes.

use anyhow::{Result, bail};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::actions::{LocalOp, Scope};
use crate::cluster::Connector;
use crate::inventory::{DaemonInventory, Inventory, LocalInventory};
use crate::local::LocalExecutor;
use crate::orchestrator::{self, Orchestrator};
use crate::path::ObjectPath;
use crate::paths::Paths;
use crate::proxy;
use crate::request::ActionRequest;
use crate::results::ActionResult;
use crate::selector::{Selector, resolve_nodes};
use crate::ui::{self, Format};
use daemonapi::DaemonApi;
use daemonapi::watch::{NODE_LABEL, PATH_LABEL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Proxy to the peers named by the node selector
    Remote,
    /// Run on this node
    Local,
    /// Declare the target state
    Async,
    /// Local run carried through the ambient daemon context
    DaemonContext,
}

/// Pick the route of a request
pub fn decide(req: &ActionRequest, cluster_context: bool) -> Route {
    if req.node_selector().is_some() {
        Route::Remote
    } else if req.is_local() || req.action().local_first {
        Route::Local
    } else if req.async_target().is_some() {
        Route::Async
    } else if !cluster_context {
        Route::Local
    } else {
        Route::DaemonContext
    }
}

/// Results of a routed request
pub struct Dispatch {
    pub route: Route,
    pub results: Vec<ActionResult>,
    /// Background `--watch` thread; join it before exiting
    pub watch: Option<JoinHandle<usize>>,
}

pub struct Router<'a> {
    conn: &'a dyn Connector,
    paths: &'a Paths,
    local: LocalExecutor<'a>,
    show_progress: bool,
    format: Format,
}

impl<'a> Router<'a> {
    pub fn new(conn: &'a dyn Connector, paths: &'a Paths, lock_timeout: Duration) -> Self {
        Self {
            conn,
            paths,
            local: LocalExecutor::new(paths, conn.nodename(), lock_timeout),
            show_progress: false,
            format: Format::Human,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Format of the `--watch` event lines
    #[must_use]
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn dispatch(&self, req: &ActionRequest) -> Result<Dispatch> {
        let context = self.conn.has_cluster_context();
        let route = decide(req, context);
        log::debug!("{}: route {route:?} (cluster context: {context})", req.action());
        if route == Route::Local && req.action().local.is_none() {
            bail!("{} needs a cluster daemon", req.action());
        }

        let (results, label, units) = match req.action().scope {
            Scope::Object => {
                let paths = self.select(req, route, context)?;
                let units = paths.iter().map(ObjectPath::fqn).collect();
                (self.run_objects(req, route, context, &paths)?, PATH_LABEL, units)
            }
            Scope::Node => {
                let (results, nodes) = self.run_nodes(req, route)?;
                (results, NODE_LABEL, nodes)
            }
        };

        let watch = if req.wait().watch {
            self.watch(req, label, units, context)
        } else {
            None
        };
        Ok(Dispatch {
            route,
            results,
            watch,
        })
    }

    /// Resolve the object selector against the inventory the route reads
    fn select(&self, req: &ActionRequest, route: Route, context: bool) -> Result<Vec<ObjectPath>> {
        if req.action().local == Some(LocalOp::Create) {
            return Ok(vec![ObjectPath::parse(req.selector())?]);
        }
        let selector = Selector::parse(req.selector())?;
        let paths = match self.conn.local_daemon() {
            Some(daemon) if context && !(route == Route::Local && req.is_local()) => {
                selector.resolve(&DaemonInventory::new(daemon))?
            }
            _ => selector.resolve(&LocalInventory::new(self.paths.clone()))?,
        };
        if paths.is_empty() {
            bail!("no object matched '{}'", req.selector());
        }
        Ok(paths)
    }

    fn target_nodes(&self, expr: &str) -> Result<Vec<String>> {
        let nodes = resolve_nodes(expr, &self.conn.cluster_nodes())?;
        if nodes.is_empty() {
            bail!("no node matched '{expr}'");
        }
        Ok(nodes)
    }

    fn daemon(&self, req: &ActionRequest) -> Result<&dyn DaemonApi> {
        match self.conn.local_daemon() {
            Some(daemon) => Ok(daemon),
            None => bail!("{} needs a cluster daemon", req.action()),
        }
    }

    fn run_objects(
        &self,
        req: &ActionRequest,
        route: Route,
        context: bool,
        paths: &[ObjectPath],
    ) -> Result<Vec<ActionResult>> {
        Ok(match route {
            Route::Remote => {
                let nodes = self.target_nodes(req.node_selector().unwrap_or_default())?;
                paths
                    .iter()
                    .flat_map(|path| {
                        nodes
                            .iter()
                            .map(move |node| proxy::invoke_object(self.conn, node, path, req))
                    })
                    .collect()
            }
            Route::Local => {
                // local-first verbs on objects configured elsewhere go through the daemon
                let forward = self
                    .conn
                    .local_daemon()
                    .filter(|_| context && !req.is_local() && req.action().local != Some(LocalOp::Create));
                let inventory = LocalInventory::new(self.paths.clone());
                paths
                    .iter()
                    .map(|path| match forward {
                        Some(daemon) if !inventory.exists(path) => {
                            log::debug!("{path}: not configured here, asking the daemon");
                            self.via_daemon(daemon, path, req)
                        }
                        _ => self.local.run_object(path, req),
                    })
                    .collect()
            }
            Route::Async => {
                let Some(target) = req.async_target() else {
                    bail!("{} has no target state", req.action());
                };
                Orchestrator::new(self.daemon(req)?, self.conn.nodename())
                    .with_progress(self.show_progress)
                    .declare_objects(paths, target, req)
            }
            Route::DaemonContext => {
                let daemon = self.daemon(req)?;
                paths
                    .iter()
                    .map(|path| self.via_daemon(daemon, path, req))
                    .collect()
            }
        })
    }

    /// Local run carried by the ambient daemon context
    fn via_daemon(&self, daemon: &dyn DaemonApi, path: &ObjectPath, req: &ActionRequest) -> ActionResult {
        let answer = daemon
            .post_object_action(&path.fqn(), req.action().remote, &req.remote_options())
            .map_err(anyhow::Error::from);
        proxy::into_result(Some(path.clone()), self.conn.nodename(), answer)
    }

    fn run_nodes(&self, req: &ActionRequest, route: Route) -> Result<(Vec<ActionResult>, Vec<String>)> {
        let nodename = self.conn.nodename().to_string();
        Ok(match route {
            Route::Remote => {
                let nodes = self.target_nodes(req.node_selector().unwrap_or_default())?;
                let results = nodes
                    .iter()
                    .map(|node| proxy::invoke_node(self.conn, node, req))
                    .collect();
                (results, nodes)
            }
            Route::Local => (vec![self.local.run_node(req)], vec![nodename]),
            Route::Async => {
                let Some(target) = req.async_target() else {
                    bail!("{} has no target state", req.action());
                };
                let nodes = self.target_nodes(req.selector())?;
                let results = Orchestrator::new(self.daemon(req)?, &nodename)
                    .with_progress(self.show_progress)
                    .declare_nodes(&nodes, target, req);
                (results, nodes)
            }
            Route::DaemonContext => {
                let answer = self
                    .daemon(req)?
                    .post_node_action(req.action().remote, &req.remote_options())
                    .map_err(anyhow::Error::from);
                let result = proxy::into_result(None, &nodename, answer);
                (vec![result], vec![nodename])
            }
        })
    }

    fn watch(
        &self,
        req: &ActionRequest,
        label: &'static str,
        units: Vec<String>,
        context: bool,
    ) -> Option<JoinHandle<usize>> {
        let daemon = self.conn.local_daemon().filter(|_| context);
        let Some(daemon) = daemon else {
            ui::warn("--watch ignored: no cluster context");
            return None;
        };
        let format = self.format;
        let spawned = orchestrator::spawn_watch(daemon, label, units, req.wait().time, move |event| {
            ui::event(event, label, format);
        });
        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("--watch: {e}");
                None
            }
        }
    }
}
