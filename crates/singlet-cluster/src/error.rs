//! Errors from peer discovery and connect requests.

/// Errors that can occur during a discovery cycle.
///
/// None of these are fatal to the poller: a failed cycle produces an
/// empty or partial node set and is retried on the next interval.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The service-directory query could not be resolved.
    #[error("service directory lookup failed for {query}: {reason}")]
    Resolve {
        /// The query that failed.
        query: String,
        /// Reason for failure.
        reason: String,
    },

    /// The membership layer could not connect to a peer.
    #[error("connection error to {node}: {reason}")]
    Connection {
        /// The node that failed.
        node: String,
        /// Reason for failure.
        reason: String,
    },
}
