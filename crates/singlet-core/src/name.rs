//! Cluster-wide identifiers: logical worker names and node names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical name under which a singleton worker is registered.
///
/// Opaque, chosen by the caller, unique within the cluster namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerName(String);

impl WorkerName {
    /// Create a name from any string-like value.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identity of a node in the cluster.
///
/// The canonical form is `{prefix}-{port}@{host}`, the shape the
/// membership poller derives from service-directory lookups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeName(String);

impl NodeName {
    /// Create a node name from an already-formed string.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Build the canonical `{prefix}-{port}@{host}` node name.
    #[must_use]
    pub fn from_endpoint(prefix: &str, port: u16, host: &str) -> Self {
        Self(format!("{prefix}-{port}@{host}"))
    }

    /// The node name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_name_display() {
        assert_eq!(WorkerName::new("cache-1").to_string(), "cache-1");
    }

    #[test]
    fn test_node_name_from_endpoint() {
        let node = NodeName::from_endpoint("svc", 9002, "host-b");
        assert_eq!(node.as_str(), "svc-9002@host-b");
    }

    #[test]
    fn test_worker_name_from_str() {
        let name: WorkerName = "cache-1".into();
        assert_eq!(name, WorkerName::new("cache-1"));
    }
}
