//! Wire types exchanged with a cluster daemon.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One record of the daemon event feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event kind, e.g. `GlobalExpectReached`.
    pub kind: String,
    /// Labels identifying the event subject (`path=`, `node=`).
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Kind-specific payload.
    #[serde(default)]
    pub data: Value,
    /// Emission time, when the daemon provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
}

impl Event {
    /// Create an event with no labels or payload.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            labels: BTreeMap::new(),
            data: Value::Null,
            at: None,
        }
    }

    /// Add a label.
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Set the payload.
    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Value of a label, if present.
    #[must_use]
    pub fn label_value(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Server-side event filter.
///
/// Empty `kinds` means every kind; every label must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Accepted event kinds.
    pub kinds: Vec<String>,
    /// Required `key=value` labels.
    pub labels: Vec<(String, String)>,
}

impl EventFilter {
    /// Filter accepting every event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an additional event kind.
    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kinds.push(kind.into());
        self
    }

    /// Require a label.
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// Whether an event passes the filter.
    #[must_use]
    pub fn accepts(&self, event: &Event) -> bool {
        (self.kinds.is_empty() || self.kinds.iter().any(|k| *k == event.kind))
            && self
                .labels
                .iter()
                .all(|(k, v)| event.label_value(k) == Some(v.as_str()))
    }

    /// Query string pairs for the `/events` endpoint.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let kinds = self.kinds.iter().map(|k| ("kind", k.clone()));
        let labels = self.labels.iter().map(|(k, v)| ("label", format!("{k}={v}")));
        kinds.chain(labels).collect()
    }
}

/// Files a peer hands to a joining node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinBundle {
    /// Cluster configuration document.
    pub cluster_toml: String,
    /// Cluster CA certificate, PEM encoded.
    pub ca_pem: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ObjectActionBody<'a> {
    pub path: &'a str,
    pub action: &'a str,
    pub options: &'a Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct NodeActionBody<'a> {
    pub action: &'a str,
    pub options: &'a Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct ObjectGlobalExpectBody<'a> {
    pub path: &'a str,
    pub global_expect: &'a str,
    pub options: &'a Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct NodeGlobalExpectBody<'a> {
    pub node: &'a str,
    pub global_expect: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_decodes_with_defaults() {
        let ev: Event = serde_json::from_str(r#"{"kind":"LeaveSuccess"}"#).unwrap();
        assert_eq!(ev.kind, "LeaveSuccess");
        assert!(ev.labels.is_empty());
        assert_eq!(ev.data, Value::Null);
    }

    #[test]
    fn test_filter_accepts() {
        let filter = EventFilter::new()
            .kind("GlobalExpectReached")
            .label("path", "ns1/svc/s1");
        let hit = Event::new("GlobalExpectReached").label("path", "ns1/svc/s1");
        let other_path = Event::new("GlobalExpectReached").label("path", "s2");
        let other_kind = Event::new("ObjectStatusUpdated").label("path", "ns1/svc/s1");

        assert!(filter.accepts(&hit));
        assert!(!filter.accepts(&other_path));
        assert!(!filter.accepts(&other_kind));
        assert!(EventFilter::new().accepts(&other_kind));
    }

    #[test]
    fn test_filter_query_pairs() {
        let filter = EventFilter::new().kind("LeaveSuccess").label("node", "n1");
        assert_eq!(
            filter.query_pairs(),
            [("kind", "LeaveSuccess".to_string()), ("label", "node=n1".to_string())]
        );
    }
}
