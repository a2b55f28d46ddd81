//! HTTP daemon client.
//!
//! JSON requests over `ureq`, with an optional bearer token. The event feed
//! is newline-delimited JSON read from a long-lived response body, so it
//! uses a second agent without the global request timeout.

use crate::backend::{DaemonApi, EventStream};
use crate::error::{Error, Result};
use crate::types::{
    Event, EventFilter, JoinBundle, NodeActionBody, NodeGlobalExpectBody, ObjectActionBody,
    ObjectGlobalExpectBody,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::{BufRead, BufReader};
use std::time::Duration;
use ureq::RequestBuilder;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Daemon reached over HTTP.
///
/// # Example
///
/// ```no_run
/// use daemonapi::backend::DaemonApi;
/// use daemonapi::backend::http::HttpDaemon;
///
/// let daemon = HttpDaemon::new("https://n1:1215").with_token("s3cr3t");
/// let nodes = daemon.node_names().unwrap();
/// println!("{} nodes", nodes.len());
/// ```
pub struct HttpDaemon {
    /// Agent for request/response calls.
    agent: ureq::Agent,
    /// Agent for the event feed.
    stream_agent: ureq::Agent,
    /// Base URL, without trailing slash.
    base: String,
    token: Option<String>,
}

impl HttpDaemon {
    /// Client for the daemon at `base`, with the default timeout.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_timeout(base, DEFAULT_TIMEOUT)
    }

    /// Client with a custom per-request timeout.
    #[must_use]
    pub fn with_timeout(base: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        let stream_agent = ureq::Agent::config_builder()
            .timeout_connect(Some(timeout))
            .build()
            .new_agent();
        Self {
            agent,
            stream_agent,
            base: base.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Authenticate every request with a bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.base)
    }

    fn authorize<B>(&self, req: RequestBuilder<B>) -> RequestBuilder<B> {
        let req = req.header("Accept", "application/json");
        match &self.token {
            Some(token) => req.header("Authorization", format!("Bearer {token}")),
            None => req,
        }
    }

    fn get_json<T: DeserializeOwned>(&self, route: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(route);
        log::debug!("GET {url}");
        let req = query
            .iter()
            .fold(self.agent.get(&url), |req, (k, v)| req.query(*k, *v));
        self.authorize(req)
            .call()
            .map_err(|e| Error::from_ureq(&url, e))?
            .body_mut()
            .read_json()
            .map_err(|e| Error::from_ureq(&url, e))
    }

    fn post<T: serde::Serialize>(&self, route: &str, body: &T) -> Result<Value> {
        let url = self.url(route);
        log::debug!("POST {url}");
        let mut response = self
            .authorize(self.agent.post(&url))
            .send_json(body)
            .map_err(|e| Error::from_ureq(&url, e))?;
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| Error::from_ureq(&url, e))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

impl DaemonApi for HttpDaemon {
    fn endpoint(&self) -> &str {
        &self.base
    }

    fn ping(&self) -> Result<()> {
        self.get_json::<Value>("/node/ping", &[]).map(|_| ())
    }

    fn object_paths(&self, selector: &str) -> Result<Vec<String>> {
        self.get_json("/object/paths", &[("selector", selector)])
    }

    fn node_names(&self) -> Result<Vec<String>> {
        self.get_json("/cluster/nodes", &[])
    }

    fn post_object_action(&self, path: &str, action: &str, options: &Value) -> Result<Value> {
        self.post(
            "/object/action",
            &ObjectActionBody {
                path,
                action,
                options,
            },
        )
    }

    fn post_node_action(&self, action: &str, options: &Value) -> Result<Value> {
        self.post("/node/action", &NodeActionBody { action, options })
    }

    fn post_object_global_expect(&self, path: &str, target: &str, options: &Value) -> Result<()> {
        self.post(
            "/object/global_expect",
            &ObjectGlobalExpectBody {
                path,
                global_expect: target,
                options,
            },
        )
        .map(|_| ())
    }

    fn post_node_global_expect(&self, node: &str, target: &str) -> Result<()> {
        self.post(
            "/node/global_expect",
            &NodeGlobalExpectBody {
                node,
                global_expect: target,
            },
        )
        .map(|_| ())
    }

    fn events(&self, filter: &EventFilter) -> Result<EventStream> {
        let url = self.url("/events");
        log::debug!("GET {url} (stream)");
        let req = filter
            .query_pairs()
            .into_iter()
            .fold(self.stream_agent.get(&url), |req, (k, v)| req.query(k, v));
        let response = self
            .authorize(req)
            .header("Accept", "application/x-ndjson")
            .call()
            .map_err(|e| Error::from_ureq(&url, e))?;
        let reader = BufReader::new(response.into_body().into_reader());
        Ok(Box::new(reader.lines().filter_map(|line| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str::<Event>(&line).map_err(Error::from)),
            Err(e) => Some(Err(Error::Io(e))),
        })))
    }

    fn post_daemon_stop(&self) -> Result<()> {
        self.post("/daemon/stop", &Value::Null).map(|_| ())
    }

    fn post_node_leave(&self) -> Result<()> {
        self.post("/node/leave", &Value::Null).map(|_| ())
    }

    fn fetch_join_bundle(&self, token: &str) -> Result<JoinBundle> {
        let url = self.url("/cluster/join");
        log::debug!("GET {url}");
        // the join token replaces the daemon token here
        self.agent
            .get(&url)
            .query("token", token)
            .header("Accept", "application/json")
            .call()
            .map_err(|e| Error::from_ureq(&url, e))?
            .body_mut()
            .read_json()
            .map_err(|e| Error::from_ureq(&url, e))
    }
}
