//! Resource selection by rid, subset and tag expressions
//!
//! The three filters are independent and AND together; an absent filter
//! lets everything through.
//!
//! - rid: `ip#1,app,disk.type=zvol`: exact RIDs, driver groups, or
//!   `<group>.<attr>=<value>` predicates, any of which may match
//! - subset: `a,b`: the resource subset is one of the listed names
//! - tag: `db,web+prod`: any comma-separated term matches; a term matches
//!   when the resource carries every `+`-joined tag

use crate::error::{Error, Result};
use crate::resource::{BoxedResource, Resource};
use crate::rid::{self, Rid};

#[derive(Debug, Clone, PartialEq, Eq)]
enum RidTerm {
    Exact(String),
    Group(String),
    Attr {
        group: String,
        attr: String,
        value: String,
    },
}

impl RidTerm {
    fn parse(term: &str, expr: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidSelector {
            kind: "rid",
            expr: expr.to_string(),
            reason: reason.to_string(),
        };
        if let Some((lhs, value)) = term.split_once('=') {
            let (group, attr) = lhs
                .split_once('.')
                .ok_or_else(|| invalid("predicate must be <group>.<attr>=<value>"))?;
            if !rid::is_group_name(group) || attr.is_empty() || value.is_empty() {
                return Err(invalid("predicate must be <group>.<attr>=<value>"));
            }
            return Ok(Self::Attr {
                group: group.to_string(),
                attr: attr.to_string(),
                value: value.to_string(),
            });
        }
        if rid::is_group_name(term) {
            return Ok(Self::Group(term.to_string()));
        }
        Rid::parse(term).map_err(|_| invalid(&format!("'{term}' is not a rid or group")))?;
        Ok(Self::Exact(term.to_string()))
    }

    fn matches(&self, r: &dyn Resource) -> bool {
        match self {
            Self::Exact(rid) => r.rid() == rid,
            Self::Group(group) => r.driver_group() == group,
            Self::Attr { group, attr, value } => {
                r.driver_group() == group && r.attr(attr).as_deref() == Some(value.as_str())
            }
        }
    }
}

/// Filter over an object's declared resources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSelector {
    rids: Vec<RidTerm>,
    subsets: Vec<String>,
    tags: Vec<Vec<String>>,
}

impl ResourceSelector {
    /// Selector letting every enabled resource through
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse the three filter expressions; `None` or empty means no restriction
    pub fn parse(rid: Option<&str>, subset: Option<&str>, tag: Option<&str>) -> Result<Self> {
        let mut selector = Self::default();

        if let Some(expr) = rid.filter(|s| !s.is_empty()) {
            for term in split_terms(expr, "rid")? {
                selector.rids.push(RidTerm::parse(term, expr)?);
            }
        }

        if let Some(expr) = subset.filter(|s| !s.is_empty()) {
            selector.subsets = split_terms(expr, "subset")?
                .into_iter()
                .map(str::to_string)
                .collect();
        }

        if let Some(expr) = tag.filter(|s| !s.is_empty()) {
            for term in split_terms(expr, "tag")? {
                let all: Vec<String> = term.split('+').map(str::to_string).collect();
                if all.iter().any(String::is_empty) {
                    return Err(Error::InvalidSelector {
                        kind: "tag",
                        expr: expr.to_string(),
                        reason: "empty tag in '+' term".to_string(),
                    });
                }
                selector.tags.push(all);
            }
        }

        Ok(selector)
    }

    /// Whether no filter is set
    pub fn is_empty(&self) -> bool {
        self.rids.is_empty() && self.subsets.is_empty() && self.tags.is_empty()
    }

    /// Whether a single resource passes every filter
    pub fn matches(&self, r: &dyn Resource) -> bool {
        if r.is_disabled() {
            return false;
        }
        if !self.rids.is_empty() && !self.rids.iter().any(|t| t.matches(r)) {
            return false;
        }
        if !self.subsets.is_empty()
            && !r
                .subset()
                .is_some_and(|s| self.subsets.iter().any(|want| want == s))
        {
            return false;
        }
        if !self.tags.is_empty()
            && !self
                .tags
                .iter()
                .any(|all| all.iter().all(|t| r.tags().contains(t)))
        {
            return false;
        }
        true
    }

    /// Candidate resources for an action, in declaration order
    pub fn filter<'a>(&self, resources: &'a [BoxedResource]) -> Vec<&'a dyn Resource> {
        resources
            .iter()
            .map(|r| &**r)
            .filter(|r| self.matches(*r))
            .collect()
    }
}

fn split_terms<'a>(expr: &'a str, kind: &'static str) -> Result<Vec<&'a str>> {
    let terms: Vec<&str> = expr.split(',').map(str::trim).collect();
    if terms.iter().any(|t| t.is_empty()) {
        return Err(Error::InvalidSelector {
            kind,
            expr: expr.to_string(),
            reason: "empty term".to_string(),
        });
    }
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ActionContext;
    use crate::types::{ActionOutcome, Verb};

    #[derive(Debug)]
    struct Res {
        rid: String,
        subset: Option<String>,
        tags: Vec<String>,
        kind: Option<String>,
        disabled: bool,
    }

    fn res(rid: &str) -> Res {
        Res {
            rid: rid.to_string(),
            subset: None,
            tags: vec![],
            kind: None,
            disabled: false,
        }
    }

    impl Resource for Res {
        fn rid(&self) -> &str {
            &self.rid
        }
        fn subset(&self) -> Option<&str> {
            self.subset.as_deref()
        }
        fn tags(&self) -> &[String] {
            &self.tags
        }
        fn attr(&self, name: &str) -> Option<String> {
            (name == "type").then(|| self.kind.clone()).flatten()
        }
        fn is_disabled(&self) -> bool {
            self.disabled
        }
        fn action(&self, _verb: Verb, _ctx: &mut ActionContext) -> anyhow::Result<ActionOutcome> {
            Ok(ActionOutcome::done())
        }
    }

    fn fixture() -> Vec<BoxedResource> {
        vec![
            Box::new(Res {
                tags: vec!["net".into()],
                ..res("ip#1")
            }),
            Box::new(Res {
                kind: Some("zvol".into()),
                subset: Some("a".into()),
                ..res("disk#1")
            }),
            Box::new(Res {
                kind: Some("lvm".into()),
                subset: Some("b".into()),
                ..res("disk#2")
            }),
            Box::new(Res {
                tags: vec!["db".into(), "prod".into()],
                ..res("app#1")
            }),
            Box::new(Res {
                disabled: true,
                ..res("app#2")
            }),
        ]
    }

    fn rids(selected: &[&dyn Resource]) -> Vec<String> {
        selected.iter().map(|r| r.rid().to_string()).collect()
    }

    #[test]
    fn test_no_filter_passes_enabled_resources() {
        let resources = fixture();
        let selected = ResourceSelector::all().filter(&resources);
        assert_eq!(rids(&selected), ["ip#1", "disk#1", "disk#2", "app#1"]);
    }

    #[test]
    fn test_rid_terms() {
        let resources = fixture();
        let sel = ResourceSelector::parse(Some("ip#1,app,disk.type=zvol"), None, None).unwrap();
        assert_eq!(rids(&sel.filter(&resources)), ["ip#1", "disk#1", "app#1"]);
    }

    #[test]
    fn test_filters_intersect() {
        let resources = fixture();
        let sel = ResourceSelector::parse(Some("disk"), Some("b"), None).unwrap();
        assert_eq!(rids(&sel.filter(&resources)), ["disk#2"]);

        let sel = ResourceSelector::parse(Some("ip"), Some("b"), None).unwrap();
        assert!(sel.filter(&resources).is_empty());
    }

    #[test]
    fn test_tag_terms() {
        let resources = fixture();
        let sel = ResourceSelector::parse(None, None, Some("net,db+prod")).unwrap();
        assert_eq!(rids(&sel.filter(&resources)), ["ip#1", "app#1"]);

        let sel = ResourceSelector::parse(None, None, Some("db+staging")).unwrap();
        assert!(sel.filter(&resources).is_empty());
    }

    #[test]
    fn test_malformed_expressions() {
        assert!(ResourceSelector::parse(Some("ip#1,,app"), None, None).is_err());
        assert!(ResourceSelector::parse(Some("disk.type="), None, None).is_err());
        assert!(ResourceSelector::parse(Some("a b"), None, None).is_err());
        assert!(ResourceSelector::parse(None, None, Some("db++prod")).is_err());
    }
}
