//! # singlet-cluster
//!
//! Cluster membership discovery for Singlet nodes.
//!
//! - [`MembershipPoller`] — on a fixed interval, resolves a
//!   service-directory query into peer endpoints, derives node names
//!   (`{prefix}-{port}@{host}`), removes the local node, and requests
//!   connections from the membership layer.
//! - [`Resolver`] — the injected DNS-capable directory client, with
//!   [`SystemResolver`] over the system's DNS.
//! - [`Connector`] — the membership layer's connect entry point.
//!
//! Discovery failures are never fatal: a failed cycle yields an empty
//! or partial peer set and is retried on the next interval.

pub mod error;
pub mod poller;
pub mod resolver;

pub use error::DiscoveryError;
pub use poller::{Connector, MembershipPoller, PollerConfig};
pub use resolver::{Resolver, SystemResolver};
