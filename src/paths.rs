//! Centralized path resolution for om
//!
//! # Environment Variables
//!
//! - `OM_CONFIG_DIR` - Override config directory (node.toml, objects/)
//! - `OM_VAR_DIR` - Override var directory (locks, flags, logs)
//!
//! # Path Resolution Priority
//!
//! For the config dir:
//! 1. `OM_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/om` (if set)
//! 3. `~/.config/om`
//!
//! For the var dir:
//! 1. `OM_VAR_DIR` environment variable
//! 2. `XDG_STATE_HOME/om` (if set)
//! 3. `~/.local/state/om`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::path::{Kind, ObjectPath};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "OM_CONFIG_DIR";

/// Environment variable for var directory override
pub const ENV_VAR_DIR: &str = "OM_VAR_DIR";

/// Resolved config and var roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    config: PathBuf,
    var: PathBuf,
}

impl Paths {
    /// Roots from the environment
    pub fn discover() -> Result<Self> {
        Ok(Self {
            config: config_dir()?,
            var: var_dir()?,
        })
    }

    /// Explicit roots
    pub fn new(config: impl Into<PathBuf>, var: impl Into<PathBuf>) -> Self {
        Self {
            config: config.into(),
            var: var.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config
    }

    pub fn var_dir(&self) -> &Path {
        &self.var
    }

    pub fn node_config(&self) -> PathBuf {
        self.config.join("node.toml")
    }

    /// Cluster overlay installed by `node join`
    pub fn cluster_config(&self) -> PathBuf {
        self.config.join("cluster.toml")
    }

    pub fn ca_file(&self) -> PathBuf {
        self.config.join("ca.pem")
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.config.join("objects")
    }

    /// Configuration file of an object
    ///
    /// `root/svc/<name>` → `<name>.toml`, other root kinds → `<kind>/<name>.toml`,
    /// namespaced → `namespaces/<ns>/<kind>/<name>.toml`.
    pub fn object_config(&self, path: &ObjectPath) -> PathBuf {
        let base = self.objects_dir();
        let file = format!("{}.toml", path.name());
        match (path.is_root(), path.kind()) {
            (true, Kind::Svc) => base.join(file),
            (true, kind) => base.join(kind.as_str()).join(file),
            (false, kind) => base
                .join("namespaces")
                .join(path.namespace())
                .join(kind.as_str())
                .join(file),
        }
    }

    /// Runtime directory of an object (lock, frozen flag, action log)
    pub fn object_var(&self, path: &ObjectPath) -> PathBuf {
        self.var
            .join("objects")
            .join(path.namespace())
            .join(path.kind().as_str())
            .join(path.name())
    }

    /// Runtime directory of the node itself
    pub fn node_var(&self) -> PathBuf {
        self.var.join("node")
    }

    /// Process-level lock serializing daemon lifecycle commands
    pub fn daemon_lock(&self) -> PathBuf {
        self.var.join("daemon.lock")
    }
}

/// Get the om config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("om");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("om");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the om var directory path
pub fn var_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_VAR_DIR) {
        let path = expand(&dir);
        log::debug!("Using var dir from {}: {}", ENV_VAR_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("om");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("om");
    log::debug!("Using default var dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Helper to run a test with temporary env var
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    fn without_env_var<F, R>(key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::remove_var(key) };
        let result = f();
        if let Some(v) = original {
            // SAFETY: Tests run in isolation
            unsafe { env::set_var(key, v) };
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/om/etc", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/om/etc"));
        });
    }

    #[test]
    fn test_var_dir_xdg_state_home() {
        without_env_var(ENV_VAR_DIR, || {
            with_env_var("XDG_STATE_HOME", "/tmp/xdg-state-om", || {
                assert_eq!(var_dir().unwrap(), PathBuf::from("/tmp/xdg-state-om/om"));
            });
        });
    }

    #[test]
    fn test_object_config_layout() {
        let paths = Paths::new("/etc/om", "/var/lib/om");
        let p = |s: &str| ObjectPath::parse(s).unwrap();

        assert_eq!(
            paths.object_config(&p("web")),
            PathBuf::from("/etc/om/objects/web.toml")
        );
        assert_eq!(
            paths.object_config(&p("cfg/app")),
            PathBuf::from("/etc/om/objects/cfg/app.toml")
        );
        assert_eq!(
            paths.object_config(&p("ns1/vol/data")),
            PathBuf::from("/etc/om/objects/namespaces/ns1/vol/data.toml")
        );
        assert_eq!(
            paths.object_var(&p("web")),
            PathBuf::from("/var/lib/om/objects/root/svc/web")
        );
    }

    #[test]
    fn test_expand_with_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/om"), home.join("om"));
    }
}
