use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use crate::paths::Paths;

/// Default lock acquisition timeout
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Node Config
// ============================================================================

/// `node.toml`, with `cluster.toml` laid over its `[cluster]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub cluster: ClusterSection,
    #[serde(default)]
    pub daemon: DaemonSection,
    #[serde(default)]
    pub peers: BTreeMap<String, PeerSection>,
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSection {
    pub name: Option<String>,
    pub lock_timeout: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSection {
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonSection {
    /// Local daemon API; absent on a standalone node
    pub url: Option<String>,
    pub token: Option<String>,
    /// Executable run by `daemon start --foreground`
    pub exec: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSection {
    pub url: String,
}

/// A `[[checks]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConfig {
    pub name: String,
    pub command: String,
}

#[derive(Debug, Deserialize)]
struct ClusterOverlay {
    cluster: ClusterSection,
}

impl ClusterSection {
    /// `[cluster]` table of a cluster.toml document
    pub fn parse_overlay(content: &str) -> Result<Self> {
        let parsed: ClusterOverlay = toml::from_str(content)?;
        Ok(parsed.cluster)
    }
}

impl NodeConfig {
    /// Load node.toml; a missing file means standalone defaults
    pub fn load(paths: &Paths) -> Result<Self> {
        let path = paths.node_config();
        let mut config: Self = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Could not read {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Invalid node config {}", path.display()))?
        } else {
            log::debug!("No node config at {}, using defaults", path.display());
            Self::default()
        };

        let overlay = paths.cluster_config();
        if overlay.exists() {
            let content = fs::read_to_string(&overlay)
                .with_context(|| format!("Could not read {}", overlay.display()))?;
            config.cluster = ClusterSection::parse_overlay(&content)
                .with_context(|| format!("Invalid cluster config {}", overlay.display()))?;
        }

        if let Some(raw) = &config.node.lock_timeout {
            parse_duration(raw)
                .map_err(|e| anyhow::anyhow!("node.lock_timeout: {e}"))?;
        }
        Ok(config)
    }

    /// This node's name: configured, else the system hostname
    pub fn nodename(&self) -> String {
        self.node
            .name
            .clone()
            .unwrap_or_else(hostname)
    }

    pub fn lock_timeout(&self) -> Duration {
        self.node
            .lock_timeout
            .as_deref()
            .and_then(|s| parse_duration(s).ok())
            .unwrap_or(DEFAULT_LOCK_TIMEOUT)
    }

    /// Cluster members; a standalone node is a cluster of one
    pub fn cluster_nodes(&self) -> Vec<String> {
        if self.cluster.nodes.is_empty() {
            vec![self.nodename()]
        } else {
            self.cluster.nodes.clone()
        }
    }

    /// Whether a daemon endpoint is configured
    pub fn has_daemon(&self) -> bool {
        self.daemon.url.is_some()
    }

    /// API endpoint of a peer node
    pub fn peer_url(&self, node: &str) -> String {
        self.peers.get(node).map_or_else(
            || format!("https://{node}:{}", daemonapi::DEFAULT_PORT),
            |p| p.url.clone(),
        )
    }
}

/// System hostname, `localhost` if it cannot be read
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes and gethostname NUL-terminates on success
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..end]);
    // short name only
    name.split('.').next().unwrap_or("localhost").to_lowercase()
}

/// Parse a humanized duration string (e.g., "500ms", "30s", "5m", "1h", "90")
///
/// A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err("Empty duration string".to_string());
    }

    let (num_str, unit_ms) = if let Some(num) = s.strip_suffix("ms") {
        (num, 1u64)
    } else if let Some(num) = s.strip_suffix('s') {
        (num, 1_000)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, 60_000)
    } else if let Some(num) = s.strip_suffix('h') {
        (num, 3_600_000)
    } else if let Some(num) = s.strip_suffix('d') {
        (num, 86_400_000)
    } else {
        (s.as_str(), 1_000)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid duration: '{s}'"))?;
    Ok(Duration::from_millis(num.saturating_mul(unit_ms)))
}
