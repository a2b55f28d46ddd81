//! Per-unit action results and their aggregation

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::path::ObjectPath;

/// Outcome for one (object or node) x executing node pair
///
/// Results are built once and never mutated after collection.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<ObjectPath>,
    pub node: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human rendering of `data`; JSON output ignores it
    #[serde(skip)]
    pub human: Option<String>,
}

impl ActionResult {
    pub fn ok(path: Option<ObjectPath>, node: impl Into<String>, data: Value) -> Self {
        Self {
            path,
            node: node.into(),
            data,
            error: None,
            human: None,
        }
    }

    pub fn failed(path: Option<ObjectPath>, node: impl Into<String>, err: &anyhow::Error) -> Self {
        Self {
            path,
            node: node.into(),
            data: Value::Null,
            error: Some(format!("{err:#}")),
            human: None,
        }
    }

    #[must_use]
    pub fn with_human(mut self, human: impl Into<String>) -> Self {
        self.human = Some(human.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// `path@node`, or the node alone for node actions
    pub fn unit(&self) -> String {
        match &self.path {
            Some(path) => format!("{path}@{}", self.node),
            None => self.node.clone(),
        }
    }
}

/// Every error of a batch
#[derive(Debug, Error)]
#[error("{} of {total} failed: {}", .errors.len(), .errors.join("; "))]
pub struct BatchError {
    pub total: usize,
    pub errors: Vec<String>,
}

impl BatchError {
    /// Collect the errors of a result set, `None` when all succeeded
    pub fn from_results(results: &[ActionResult]) -> Option<Self> {
        let errors: Vec<String> = results
            .iter()
            .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {e}", r.unit())))
            .collect();
        if errors.is_empty() {
            None
        } else {
            Some(Self {
                total: results.len(),
                errors,
            })
        }
    }
}

/// Process exit code for a result set
pub fn exit_code(results: &[ActionResult]) -> i32 {
    i32::from(results.iter().any(|r| !r.is_ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> Option<ObjectPath> {
        Some(ObjectPath::parse(s).unwrap())
    }

    #[test]
    fn test_batch_error_lists_every_failure() {
        let results = vec![
            ActionResult::ok(path("a"), "n1", json!({"ok": true})),
            ActionResult::failed(path("b"), "n1", &anyhow::anyhow!("boom")),
            ActionResult::failed(None, "n2", &anyhow::anyhow!("down")),
        ];
        let err = BatchError::from_results(&results).unwrap();
        assert_eq!(err.to_string(), "2 of 3 failed: b@n1: boom; n2: down");
        assert_eq!(exit_code(&results), 1);
    }

    #[test]
    fn test_all_ok() {
        let results = vec![ActionResult::ok(path("a"), "n1", Value::Null)];
        assert!(BatchError::from_results(&results).is_none());
        assert_eq!(exit_code(&results), 0);
        assert_eq!(exit_code(&[]), 0);
    }

    #[test]
    fn test_json_shape() {
        let r = ActionResult::failed(path("ns1/vol/data"), "n1", &anyhow::anyhow!("x"))
            .with_human("ignored");
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({"path": "ns1/vol/data", "node": "n1", "error": "x"})
        );
    }
}
