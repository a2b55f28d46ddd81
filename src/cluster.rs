//! Access to the local daemon and peer nodes

use anyhow::Result;
use std::sync::OnceLock;

use crate::config::NodeConfig;
use daemonapi::{DaemonApi, HttpDaemon};

/// Where daemon and peer clients come from
pub trait Connector {
    /// This node's name
    fn nodename(&self) -> &str;

    /// Cluster members
    fn cluster_nodes(&self) -> Vec<String>;

    /// The local daemon, when one is configured
    fn local_daemon(&self) -> Option<&dyn DaemonApi>;

    /// Client for a peer node's API
    fn peer(&self, node: &str) -> Result<Box<dyn DaemonApi>>;

    /// Whether a daemon is configured and answers
    fn has_cluster_context(&self) -> bool {
        answers(self.local_daemon())
    }
}

fn answers(daemon: Option<&dyn DaemonApi>) -> bool {
    daemon.is_some_and(|d| match d.ping() {
        Ok(()) => true,
        Err(e) => {
            log::info!("no cluster context: {e}");
            false
        }
    })
}

/// HTTP clients built from the node configuration
pub struct HttpConnector {
    config: NodeConfig,
    nodename: String,
    local: Option<HttpDaemon>,
    context: OnceLock<bool>,
}

impl HttpConnector {
    pub fn new(config: NodeConfig) -> Self {
        let local = config.daemon.url.as_deref().map(|url| {
            let daemon = HttpDaemon::new(url);
            match &config.daemon.token {
                Some(token) => daemon.with_token(token.clone()),
                None => daemon,
            }
        });
        Self {
            nodename: config.nodename(),
            local,
            config,
            context: OnceLock::new(),
        }
    }
}

impl Connector for HttpConnector {
    fn nodename(&self) -> &str {
        &self.nodename
    }

    fn cluster_nodes(&self) -> Vec<String> {
        if self.config.cluster.nodes.is_empty() && self.has_cluster_context() {
            if let Some(Ok(nodes)) = self.local.as_ref().map(DaemonApi::node_names) {
                return nodes;
            }
        }
        self.config.cluster_nodes()
    }

    fn local_daemon(&self) -> Option<&dyn DaemonApi> {
        self.local.as_ref().map(|d| d as &dyn DaemonApi)
    }

    fn peer(&self, node: &str) -> Result<Box<dyn DaemonApi>> {
        let url = if node == self.nodename {
            self.config
                .daemon
                .url
                .clone()
                .unwrap_or_else(|| self.config.peer_url(node))
        } else {
            self.config.peer_url(node)
        };
        log::debug!("peer {node}: {url}");
        let daemon = HttpDaemon::new(url);
        Ok(Box::new(match &self.config.daemon.token {
            Some(token) => daemon.with_token(token.clone()),
            None => daemon,
        }))
    }

    fn has_cluster_context(&self) -> bool {
        *self.context.get_or_init(|| answers(self.local_daemon()))
    }
}

#[cfg(test)]
pub mod mock {
    //! In-memory connector over [`MockDaemon`]s

    use super::*;
    use daemonapi::MockDaemon;
    use std::collections::BTreeMap;

    pub struct MockConnector {
        pub nodename: String,
        pub nodes: Vec<String>,
        pub local: Option<MockDaemon>,
        pub peers: BTreeMap<String, MockDaemon>,
    }

    impl MockConnector {
        /// Standalone node: no daemon
        pub fn standalone(nodename: &str) -> Self {
            Self {
                nodename: nodename.to_string(),
                nodes: vec![nodename.to_string()],
                local: None,
                peers: BTreeMap::new(),
            }
        }

        /// Cluster member with a reachable local daemon
        pub fn clustered(nodename: &str, nodes: &[&str], local: MockDaemon) -> Self {
            Self {
                nodename: nodename.to_string(),
                nodes: nodes.iter().map(ToString::to_string).collect(),
                local: Some(local),
                peers: BTreeMap::new(),
            }
        }

        pub fn with_peer(mut self, node: &str, daemon: MockDaemon) -> Self {
            self.peers.insert(node.to_string(), daemon);
            self
        }
    }

    impl Connector for MockConnector {
        fn nodename(&self) -> &str {
            &self.nodename
        }

        fn cluster_nodes(&self) -> Vec<String> {
            self.nodes.clone()
        }

        fn local_daemon(&self) -> Option<&dyn DaemonApi> {
            self.local.as_ref().map(|d| d as &dyn DaemonApi)
        }

        fn peer(&self, node: &str) -> Result<Box<dyn DaemonApi>> {
            match self.peers.get(node) {
                Some(d) => Ok(Box::new(d.clone())),
                None => anyhow::bail!("no route to {node}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockConnector;
    use super::*;
    use daemonapi::MockDaemon;

    #[test]
    fn test_standalone_has_no_context() {
        let config = NodeConfig::default();
        let conn = HttpConnector::new(config);
        assert!(conn.local_daemon().is_none());
        assert!(!conn.has_cluster_context());
        assert_eq!(conn.cluster_nodes(), [conn.nodename().to_string()]);
    }

    #[test]
    fn test_unreachable_daemon_has_no_context() {
        let mut config = NodeConfig::default();
        config.node.name = Some("n1".into());
        config.daemon.url = Some("http://127.0.0.1:9".into());
        config.cluster.nodes = vec!["n1".into(), "n2".into()];
        let conn = HttpConnector::new(config);
        assert!(!conn.has_cluster_context());
        assert_eq!(conn.cluster_nodes(), ["n1", "n2"]);
        assert_eq!(conn.peer("n2").unwrap().endpoint(), "https://n2:1215");
        assert_eq!(conn.peer("n1").unwrap().endpoint(), "http://127.0.0.1:9");
    }

    #[test]
    fn test_mock_context() {
        let conn = MockConnector::clustered("n1", &["n1", "n2"], MockDaemon::new());
        assert!(conn.has_cluster_context());
        let down = MockConnector::clustered("n1", &["n1"], MockDaemon::new().unreachable());
        assert!(!down.has_cluster_context());
        assert!(!MockConnector::standalone("n1").has_cluster_context());
    }
}
