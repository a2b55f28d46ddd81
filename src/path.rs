//! Object identity: namespace, kind and name
//!
//! The canonical string omits the `root` namespace and, for `svc` objects,
//! the kind: `web`, `cfg/app`, `ns1/svc/db`. The fully-qualified form always
//! has three segments: `root/svc/web`.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// The namespace holding objects declared without one
pub const ROOT_NAMESPACE: &str = "root";

static NAME_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid object path '{0}': expected <name>, <kind>/<name> or <namespace>/<kind>/<name>")]
    Segments(String),

    #[error("unknown object kind '{0}'")]
    Kind(String),

    #[error("invalid {field} '{value}': must be a hostname-like label")]
    Syntax { field: &'static str, value: String },

    #[error("'{0}' is a reserved name")]
    Reserved(String),
}

/// Object kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Svc,
    Vol,
    Cfg,
    Sec,
    Usr,
    Ccfg,
    Nscfg,
}

/// What an object of a given kind can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Keyword configuration (every kind)
    Configurable,
    /// Resource lifecycle: start, stop, provision, run, sync...
    Startable,
    /// Orchestration freeze flag
    Freezable,
    /// Interactive access to a resource
    Enterable,
}

impl Kind {
    pub const ALL: [Kind; 7] = [
        Kind::Svc,
        Kind::Vol,
        Kind::Cfg,
        Kind::Sec,
        Kind::Usr,
        Kind::Ccfg,
        Kind::Nscfg,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Svc => "svc",
            Kind::Vol => "vol",
            Kind::Cfg => "cfg",
            Kind::Sec => "sec",
            Kind::Usr => "usr",
            Kind::Ccfg => "ccfg",
            Kind::Nscfg => "nscfg",
        }
    }

    pub fn supports(self, capability: Capability) -> bool {
        match capability {
            Capability::Configurable => true,
            Capability::Startable | Capability::Freezable => matches!(self, Kind::Svc | Kind::Vol),
            Capability::Enterable => self == Kind::Svc,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| PathError::Kind(s.to_string()))
    }
}

/// Identity of a managed object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    namespace: String,
    kind: Kind,
    name: String,
}

impl ObjectPath {
    pub fn new(namespace: &str, kind: Kind, name: &str) -> Result<Self, PathError> {
        check_label("namespace", namespace)?;
        check_label("name", name)?;
        if Kind::from_str(name).is_ok() || name == "namespaces" {
            return Err(PathError::Reserved(name.to_string()));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            kind,
            name: name.to_string(),
        })
    }

    /// Parse a canonical or fully-qualified path string
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let segments: Vec<&str> = s.split('/').collect();
        match segments.as_slice() {
            [name] => Self::new(ROOT_NAMESPACE, Kind::Svc, name),
            [kind, name] => Self::new(ROOT_NAMESPACE, kind.parse()?, name),
            [ns, kind, name] => Self::new(ns, kind.parse()?, name),
            _ => Err(PathError::Segments(s.to_string())),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_root(&self) -> bool {
        self.namespace == ROOT_NAMESPACE
    }

    /// `namespace/kind/name`
    pub fn fqn(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

fn check_label(field: &'static str, value: &str) -> Result<(), PathError> {
    let valid = NAME_RE
        .as_ref()
        .is_ok_and(|re| re.is_match(value));
    if valid {
        Ok(())
    } else {
        Err(PathError::Syntax {
            field,
            value: value.to_string(),
        })
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_root(), self.kind) {
            (true, Kind::Svc) => write!(f, "{}", self.name),
            (true, kind) => write!(f, "{kind}/{}", self.name),
            (false, kind) => write!(f, "{}/{kind}/{}", self.namespace, self.name),
        }
    }
}

impl FromStr for ObjectPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Ordered by canonical string, the order every selection is reported in
impl Ord for ObjectPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl PartialOrd for ObjectPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for ObjectPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
