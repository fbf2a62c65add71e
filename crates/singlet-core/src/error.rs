//! Error types for proxy construction, forwarding, and the naming facility.

use crate::name::WorkerName;

/// Errors surfaced synchronously when bringing a proxy up.
///
/// Construction failures are fatal and local: the proxy does not retry,
/// and no registration is left behind.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// The worker constructor did not return a usable worker.
    #[error("worker factory failed: {0}")]
    Factory(String),

    /// The name already has a live holder in the local view.
    #[error("name {0} is already registered")]
    AlreadyRegistered(WorkerName),

    /// The naming facility rejected the registration.
    #[error("naming facility error: {0}")]
    Naming(#[from] NamingError),
}

/// Errors surfaced to callers of proxy operations.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// No live proxy is registered under the target name.
    #[error("no registration for {0}")]
    NotRegistered(WorkerName),

    /// The proxy or its worker terminated before replying.
    ///
    /// In-flight calls during a conflict yield surface here; they are
    /// safe for the caller to retry at its own discretion.
    #[error("worker terminated before replying")]
    WorkerGone,

    /// The caller-side deadline elapsed before a reply arrived.
    #[error("call timed out")]
    Timeout,
}

/// Errors from the cluster-wide naming facility.
#[derive(Debug, thiserror::Error)]
pub enum NamingError {
    /// Registration was rejected because the name has a live holder.
    #[error("name {0} is already registered")]
    AlreadyRegistered(WorkerName),

    /// The facility backend is unreachable or shut down.
    #[error("naming facility unavailable: {0}")]
    Unavailable(String),
}
