//! Periodic peer discovery and connect requests.
//!
//! On a fixed interval the poller resolves the configured
//! service-directory query, maps each `(port, host)` pair to a node
//! name (`{prefix}-{port}@{host}`), removes the local node, and asks
//! the membership layer to connect to the remainder. A failed cycle is
//! never fatal; the next tick retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use singlet_core::NodeName;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::DiscoveryError;
use crate::resolver::Resolver;

/// Configuration for the membership poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Service-directory query to resolve each cycle (`host:port` form).
    pub query: String,
    /// Short-name prefix for derived node names.
    pub node_name_prefix: String,
    /// Interval between discovery cycles.
    pub poll_interval: Duration,
    /// Log the discovered peer set each cycle.
    pub debug_logging: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            query: "singlet.internal:4369".into(),
            node_name_prefix: "singlet".into(),
            poll_interval: Duration::from_secs(5),
            debug_logging: false,
        }
    }
}

/// The membership layer's connect entry point.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Request a cluster connection to `node`.
    async fn connect(&self, node: &NodeName) -> Result<(), DiscoveryError>;
}

/// Handle to a running membership poller.
#[derive(Debug)]
pub struct MembershipPoller {
    cancel: CancellationToken,
    peers_rx: watch::Receiver<Vec<NodeName>>,
}

impl MembershipPoller {
    /// Spawn the poller task.
    #[must_use]
    pub fn spawn(
        config: PollerConfig,
        local_node: NodeName,
        resolver: Arc<dyn Resolver>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (peers_tx, peers_rx) = watch::channel(Vec::new());
        let cancel = CancellationToken::new();

        tokio::spawn(run_poller(
            config,
            local_node,
            resolver,
            connector,
            peers_tx,
            cancel.clone(),
        ));

        Self { cancel, peers_rx }
    }

    /// Watch channel carrying the most recent peer set (local node
    /// removed), updated after every successful cycle.
    #[must_use]
    pub fn peers_watch(&self) -> watch::Receiver<Vec<NodeName>> {
        self.peers_rx.clone()
    }

    /// Stop the poller task.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

async fn run_poller(
    config: PollerConfig,
    local_node: NodeName,
    resolver: Arc<dyn Resolver>,
    connector: Arc<dyn Connector>,
    peers_tx: watch::Sender<Vec<NodeName>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.poll_interval);
    tracing::debug!(query = %config.query, local = %local_node, "membership poller started");

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            _ = ticker.tick() => {
                let endpoints = match resolver.lookup(&config.query).await {
                    Ok(endpoints) => endpoints,
                    Err(error) => {
                        tracing::warn!(query = %config.query, error = %error, "discovery cycle failed");
                        continue;
                    }
                };

                let mut peers: Vec<NodeName> = endpoints
                    .iter()
                    .map(|(port, host)| {
                        NodeName::from_endpoint(&config.node_name_prefix, *port, host)
                    })
                    .filter(|node| *node != local_node)
                    .collect();
                peers.sort();
                peers.dedup();

                if config.debug_logging {
                    tracing::debug!(query = %config.query, peers = ?peers, "discovered peer nodes");
                }

                for node in &peers {
                    if let Err(error) = connector.connect(node).await {
                        // Partial connectivity this cycle; the next
                        // tick tries again.
                        tracing::warn!(node = %node, error = %error, "connect request failed");
                    }
                }

                let _ = peers_tx.send(peers);
            }
        }
    }

    tracing::debug!(local = %local_node, "membership poller stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;

    use super::*;

    struct CannedResolver {
        pairs: Vec<(u16, String)>,
        fail_first: AtomicU32,
    }

    #[async_trait]
    impl Resolver for CannedResolver {
        async fn lookup(&self, query: &str) -> Result<Vec<(u16, String)>, DiscoveryError> {
            if self.fail_first.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                n.checked_sub(1)
            })
            .is_ok()
            {
                return Err(DiscoveryError::Resolve {
                    query: query.to_string(),
                    reason: "transient failure".into(),
                });
            }
            Ok(self.pairs.clone())
        }
    }

    #[derive(Default)]
    struct RecordingConnector {
        requested: Mutex<Vec<NodeName>>,
    }

    #[async_trait]
    impl Connector for RecordingConnector {
        async fn connect(&self, node: &NodeName) -> Result<(), DiscoveryError> {
            self.requested.lock().push(node.clone());
            Ok(())
        }
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    async fn next_peer_set(rx: &mut watch::Receiver<Vec<NodeName>>) -> Vec<NodeName> {
        rx.changed().await.unwrap();
        rx.borrow_and_update().clone()
    }

    #[test]
    fn test_config_defaults() {
        let config = PollerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert!(!config.debug_logging);
    }

    #[tokio::test]
    async fn test_discovers_peers_and_removes_self() {
        init_tracing();
        let resolver = Arc::new(CannedResolver {
            pairs: vec![(9001, "host-a".into()), (9002, "host-b".into())],
            fail_first: AtomicU32::new(0),
        });
        let connector = Arc::new(RecordingConnector::default());

        let poller = MembershipPoller::spawn(
            PollerConfig {
                query: "svc.cluster.local:4369".into(),
                node_name_prefix: "svc".into(),
                poll_interval: Duration::from_millis(10),
                debug_logging: true,
            },
            NodeName::new("svc-9001@host-a"),
            resolver,
            Arc::clone(&connector) as Arc<dyn Connector>,
        );

        let peers = next_peer_set(&mut poller.peers_watch()).await;
        assert_eq!(peers, vec![NodeName::new("svc-9002@host-b")]);

        let requested = connector.requested.lock().clone();
        assert_eq!(requested, vec![NodeName::new("svc-9002@host-b")]);
        poller.stop();
    }

    #[tokio::test]
    async fn test_resolver_failure_is_retried_next_cycle() {
        let resolver = Arc::new(CannedResolver {
            pairs: vec![(9002, "host-b".into())],
            fail_first: AtomicU32::new(2),
        });
        let connector = Arc::new(RecordingConnector::default());

        let poller = MembershipPoller::spawn(
            PollerConfig {
                query: "svc.cluster.local:4369".into(),
                node_name_prefix: "svc".into(),
                poll_interval: Duration::from_millis(10),
                debug_logging: false,
            },
            NodeName::new("svc-9001@host-a"),
            resolver,
            Arc::clone(&connector) as Arc<dyn Connector>,
        );

        // The first two cycles fail; the third succeeds.
        let peers = next_peer_set(&mut poller.peers_watch()).await;
        assert_eq!(peers, vec![NodeName::new("svc-9002@host-b")]);
        poller.stop();
    }

    #[tokio::test]
    async fn test_duplicate_records_collapse() {
        let resolver = Arc::new(CannedResolver {
            pairs: vec![
                (9002, "host-b".into()),
                (9002, "host-b".into()),
                (9003, "host-c".into()),
            ],
            fail_first: AtomicU32::new(0),
        });
        let connector = Arc::new(RecordingConnector::default());

        let poller = MembershipPoller::spawn(
            PollerConfig {
                query: "svc.cluster.local:4369".into(),
                node_name_prefix: "svc".into(),
                poll_interval: Duration::from_millis(10),
                debug_logging: false,
            },
            NodeName::new("svc-9001@host-a"),
            resolver,
            Arc::clone(&connector) as Arc<dyn Connector>,
        );

        let peers = next_peer_set(&mut poller.peers_watch()).await;
        assert_eq!(
            peers,
            vec![
                NodeName::new("svc-9002@host-b"),
                NodeName::new("svc-9003@host-c"),
            ]
        );
        poller.stop();
    }

    #[tokio::test]
    async fn test_stop_ends_updates() {
        let resolver = Arc::new(CannedResolver {
            pairs: vec![(9002, "host-b".into())],
            fail_first: AtomicU32::new(0),
        });
        let connector = Arc::new(RecordingConnector::default());

        let poller = MembershipPoller::spawn(
            PollerConfig {
                poll_interval: Duration::from_millis(10),
                ..PollerConfig::default()
            },
            NodeName::new("singlet-9001@host-a"),
            resolver,
            connector,
        );

        let mut rx = poller.peers_watch();
        rx.changed().await.unwrap();
        poller.stop();

        // After cancellation the sender side is dropped with the task.
        while rx.changed().await.is_ok() {}
    }
}
