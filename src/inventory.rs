//! Object inventories selectors resolve against
//!
//! The local inventory is the set of object configuration files present on
//! this node; the daemon inventory is the cluster-wide view served by the
//! daemon.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::path::{Kind, ObjectPath, ROOT_NAMESPACE};
use crate::paths::Paths;
use daemonapi::DaemonApi;

/// Read-only view of the known objects
pub trait Inventory {
    /// Candidate paths; `hint` is the selector, for inventories able to
    /// pre-filter
    fn paths(&self, hint: &str) -> Result<Vec<ObjectPath>>;

    /// Whether an object is known
    fn exists(&self, path: &ObjectPath) -> bool;
}

/// Objects configured on this node
pub struct LocalInventory {
    paths: Paths,
}

impl LocalInventory {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    pub fn config_file(&self, path: &ObjectPath) -> PathBuf {
        self.paths.object_config(path)
    }
}

impl Inventory for LocalInventory {
    fn paths(&self, _hint: &str) -> Result<Vec<ObjectPath>> {
        let root = self.paths.objects_dir();
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in WalkDir::new(&root).min_depth(1).max_depth(4) {
            let entry =
                entry.with_context(|| format!("Could not scan {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&root) else {
                continue;
            };
            match path_from_file(rel) {
                Some(path) => found.push(path),
                None => log::debug!("ignoring {}", entry.path().display()),
            }
        }
        Ok(found)
    }

    fn exists(&self, path: &ObjectPath) -> bool {
        self.config_file(path).is_file()
    }
}

/// Map a file under the objects dir back to its object path
fn path_from_file(rel: &Path) -> Option<ObjectPath> {
    if rel.extension()? != "toml" {
        return None;
    }
    let stem = rel.file_stem()?.to_str()?;
    let dirs: Vec<&str> = rel
        .parent()?
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    match dirs.as_slice() {
        [] => ObjectPath::new(ROOT_NAMESPACE, Kind::Svc, stem).ok(),
        [kind] => ObjectPath::new(ROOT_NAMESPACE, kind.parse().ok()?, stem).ok(),
        ["namespaces", ns, kind] => ObjectPath::new(ns, kind.parse().ok()?, stem).ok(),
        _ => None,
    }
}

/// Fixed list of paths
pub struct StaticInventory {
    paths: Vec<ObjectPath>,
}

impl StaticInventory {
    /// Build from path strings, skipping invalid ones
    pub fn new<S: AsRef<str>>(paths: &[S]) -> Self {
        Self {
            paths: paths
                .iter()
                .filter_map(|p| match ObjectPath::parse(p.as_ref()) {
                    Ok(path) => Some(path),
                    Err(e) => {
                        log::warn!("ignoring inventory entry: {e}");
                        None
                    }
                })
                .collect(),
        }
    }
}

impl Inventory for StaticInventory {
    fn paths(&self, _hint: &str) -> Result<Vec<ObjectPath>> {
        Ok(self.paths.clone())
    }

    fn exists(&self, path: &ObjectPath) -> bool {
        self.paths.contains(path)
    }
}

/// Cluster-wide objects, as known by a daemon
pub struct DaemonInventory<'a> {
    api: &'a dyn DaemonApi,
}

impl<'a> DaemonInventory<'a> {
    pub fn new(api: &'a dyn DaemonApi) -> Self {
        Self { api }
    }
}

impl Inventory for DaemonInventory<'_> {
    fn paths(&self, hint: &str) -> Result<Vec<ObjectPath>> {
        let listed = self
            .api
            .object_paths(hint)
            .with_context(|| format!("Could not list objects from {}", self.api.endpoint()))?;
        StaticInventory::new(&listed).paths(hint)
    }

    fn exists(&self, path: &ObjectPath) -> bool {
        self.paths(&path.fqn())
            .is_ok_and(|paths| paths.contains(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daemonapi::MockDaemon;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_local_inventory_layout() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::new(dir.path().join("etc"), dir.path().join("var"));
        let objects = paths.objects_dir();
        fs::create_dir_all(objects.join("cfg")).unwrap();
        fs::create_dir_all(objects.join("namespaces/ns1/vol")).unwrap();
        fs::write(objects.join("web.toml"), "").unwrap();
        fs::write(objects.join("cfg/app.toml"), "").unwrap();
        fs::write(objects.join("namespaces/ns1/vol/data.toml"), "").unwrap();
        fs::write(objects.join("notes.txt"), "").unwrap();
        fs::write(objects.join("cfg/Bad_Name.toml"), "").unwrap();

        let inventory = LocalInventory::new(paths);
        let mut found: Vec<String> = inventory
            .paths("**")
            .unwrap()
            .iter()
            .map(ObjectPath::fqn)
            .collect();
        found.sort();
        assert_eq!(found, ["ns1/vol/data", "root/cfg/app", "root/svc/web"]);
        assert!(inventory.exists(&ObjectPath::parse("web").unwrap()));
        assert!(!inventory.exists(&ObjectPath::parse("db").unwrap()));
    }

    #[test]
    fn test_local_inventory_without_objects_dir() {
        let dir = TempDir::new().unwrap();
        let inventory = LocalInventory::new(Paths::new(dir.path(), dir.path()));
        assert!(inventory.paths("**").unwrap().is_empty());
    }

    #[test]
    fn test_daemon_inventory() {
        let mock = MockDaemon::new().with_paths(&["root/svc/web", "ns1/svc/db", "bad//path"]);
        let inventory = DaemonInventory::new(&mock);
        assert_eq!(inventory.paths("**").unwrap().len(), 2);
        assert!(inventory.exists(&ObjectPath::parse("ns1/svc/db").unwrap()));

        let down = MockDaemon::new().unreachable();
        assert!(DaemonInventory::new(&down).paths("**").is_err());
    }
}
