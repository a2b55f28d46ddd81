//! Object and node selector expressions
//!
//! An expression is a comma-separated union of terms; a term is a
//! `+`-separated intersection of glob fragments. Fragments match the
//! fully-qualified `namespace/kind/name` string, case-insensitively:
//!
//! - `**` and fragments containing `**` match as written
//! - a 1-segment fragment anchors to `*/svc/<fragment>`
//! - a 2-segment fragment anchors to `root/<fragment>`
//!
//! Resolution is read-only over an [`Inventory`] and always returns paths
//! sorted by canonical string, without duplicates.

use anyhow::Result;
use glob::{MatchOptions, Pattern};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::inventory::Inventory;
use crate::path::ObjectPath;

const MATCH: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid selector '{expr}': {reason}")]
    Invalid { expr: String, reason: String },

    #[error("node '{0}' is not a cluster member")]
    UnknownNode(String),
}

/// A parsed object selector
#[derive(Debug, Clone)]
pub struct Selector {
    expr: String,
    terms: Vec<Vec<Pattern>>,
}

impl Selector {
    pub fn parse(expr: &str) -> Result<Self, SelectorError> {
        let invalid = |reason: String| SelectorError::Invalid {
            expr: expr.to_string(),
            reason,
        };
        let mut terms = Vec::new();
        for term in expr.split(',').map(str::trim) {
            let mut fragments = Vec::new();
            for fragment in term.split('+').map(str::trim) {
                if fragment.is_empty() {
                    return Err(invalid("empty fragment".to_string()));
                }
                let anchored = anchor(fragment).map_err(invalid)?;
                let pattern = Pattern::new(&anchored).map_err(|e| invalid(e.to_string()))?;
                fragments.push(pattern);
            }
            terms.push(fragments);
        }
        Ok(Self {
            expr: expr.to_string(),
            terms,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn matches(&self, path: &ObjectPath) -> bool {
        let fqn = path.fqn();
        self.terms
            .iter()
            .any(|all| all.iter().all(|p| p.matches_with(&fqn, MATCH)))
    }

    /// Matching paths of an inventory, sorted and deduplicated
    pub fn resolve(&self, inventory: &dyn Inventory) -> Result<Vec<ObjectPath>> {
        let found: BTreeSet<ObjectPath> = inventory
            .paths(self.expr())?
            .into_iter()
            .filter(|p| self.matches(p))
            .collect();
        log::debug!("selector '{}' matched {} object(s)", self.expr, found.len());
        Ok(found.into_iter().collect())
    }
}

fn anchor(fragment: &str) -> Result<String, String> {
    if fragment.contains("**") {
        return Ok(fragment.to_string());
    }
    match fragment.split('/').count() {
        1 => Ok(format!("*/svc/{fragment}")),
        2 => Ok(format!("root/{fragment}")),
        3 => Ok(fragment.to_string()),
        _ => Err("too many path segments".to_string()),
    }
}

/// Expand a node selector against the cluster node list
///
/// Comma-separated globs; a name without glob characters must be a member.
pub fn resolve_nodes(expr: &str, nodes: &[String]) -> Result<Vec<String>, SelectorError> {
    let mut selected = BTreeSet::new();
    for term in expr.split(',').map(str::trim) {
        if term.is_empty() {
            return Err(SelectorError::Invalid {
                expr: expr.to_string(),
                reason: "empty node name".to_string(),
            });
        }
        if !term.contains(['*', '?', '[']) {
            let node = nodes
                .iter()
                .find(|n| n.eq_ignore_ascii_case(term))
                .ok_or_else(|| SelectorError::UnknownNode(term.to_string()))?;
            selected.insert(node.clone());
            continue;
        }
        let pattern = Pattern::new(term).map_err(|e| SelectorError::Invalid {
            expr: expr.to_string(),
            reason: e.to_string(),
        })?;
        selected.extend(
            nodes
                .iter()
                .filter(|n| pattern.matches_with(n, MATCH))
                .cloned(),
        );
    }
    Ok(selected.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::StaticInventory;

    fn inventory() -> StaticInventory {
        StaticInventory::new(&[
            "root/svc/svc1",
            "root/svc/db1",
            "root/svc/db2",
            "root/cfg/db-conf",
            "ns1/svc/s1",
            "ns1/svc/db3",
            "ns1/vol/data",
        ])
    }

    fn expand(expr: &str) -> Vec<String> {
        Selector::parse(expr)
            .unwrap()
            .resolve(&inventory())
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_forms_resolve_to_same_path() {
        assert_eq!(expand("svc1"), ["svc1"]);
        assert_eq!(expand("svc/svc1"), ["svc1"]);
        assert_eq!(expand("root/svc/svc1"), ["svc1"]);
    }

    #[test]
    fn test_glob_and_double_star() {
        assert_eq!(expand("**/db*"), ["cfg/db-conf", "db1", "db2", "ns1/svc/db3"]);
        assert_eq!(expand("*/svc/*").len(), 5);
        assert_eq!(expand("**").len(), 7);
        assert_eq!(expand("DB1"), ["db1"]);
    }

    #[test]
    fn test_one_segment_spans_namespaces() {
        assert_eq!(expand("db*"), ["db1", "db2", "ns1/svc/db3"]);
    }

    #[test]
    fn test_intersection_and_union() {
        assert_eq!(expand("ns1/**+*/svc/*"), ["ns1/svc/db3", "ns1/svc/s1"]);
        assert_eq!(expand("svc1,ns1/vol/data"), ["ns1/vol/data", "svc1"]);
        // duplicates collapse
        assert_eq!(expand("db1,db*"), ["db1", "db2", "ns1/svc/db3"]);
    }

    #[test]
    fn test_no_match_is_empty() {
        assert!(expand("nothing*").is_empty());
    }

    #[test]
    fn test_invalid_expressions() {
        assert!(Selector::parse("a++b").is_err());
        assert!(Selector::parse("a,").is_err());
        assert!(Selector::parse("a/b/c/d").is_err());
        assert!(Selector::parse("[").is_err());
    }

    #[test]
    fn test_resolve_nodes() {
        let nodes: Vec<String> = ["n1", "n2", "db1"].iter().map(ToString::to_string).collect();
        assert_eq!(resolve_nodes("n*", &nodes).unwrap(), ["n1", "n2"]);
        assert_eq!(resolve_nodes("n2,N1", &nodes).unwrap(), ["n1", "n2"]);
        assert_eq!(
            resolve_nodes("n9", &nodes),
            Err(SelectorError::UnknownNode("n9".into()))
        );
        assert!(resolve_nodes("x*", &nodes).unwrap().is_empty());
    }
}
