//! Synchronous execution on a named peer
//!
//! The peer's answer is returned verbatim; only transport and status
//! errors are interpreted here.

use serde_json::Value;

use crate::cluster::Connector;
use crate::path::ObjectPath;
use crate::request::ActionRequest;
use crate::results::ActionResult;

/// Run an object action on `node`
pub fn invoke_object(
    conn: &dyn Connector,
    node: &str,
    path: &ObjectPath,
    req: &ActionRequest,
) -> ActionResult {
    let action = req.action().remote;
    log::info!("{path}: {action} on {node}");
    let answer = conn.peer(node).and_then(|peer| {
        peer.post_object_action(&path.fqn(), action, &req.remote_options())
            .map_err(anyhow::Error::from)
    });
    into_result(Some(path.clone()), node, answer)
}

/// Run a node action on `node`
pub fn invoke_node(conn: &dyn Connector, node: &str, req: &ActionRequest) -> ActionResult {
    let action = req.action().remote;
    log::info!("node {action} on {node}");
    let answer = conn.peer(node).and_then(|peer| {
        peer.post_node_action(action, &req.remote_options())
            .map_err(anyhow::Error::from)
    });
    into_result(None, node, answer)
}

/// Turn a peer's answer into a batch result
pub(crate) fn into_result(path: Option<ObjectPath>, node: &str, answer: anyhow::Result<Value>) -> ActionResult {
    match answer {
        Ok(data) => ActionResult::ok(path, node, data),
        Err(e) => {
            log::warn!("{node}: {e:#}");
            ActionResult::failed(path, node, &e)
        }
    }
}
