//! Cluster-wide naming facility: register/resolve/deregister plus
//! asynchronous conflict notification.
//!
//! The distributed broadcast mechanics live behind [`NamingFacility`];
//! the proxy core depends only on this seam. [`MemoryNaming`] is the
//! in-process backend used by tests and single-process clusters, with
//! explicit hooks to simulate the eventually-consistent race window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::NamingError;
use crate::name::WorkerName;
use crate::proxy::{ProxyId, ProxyRef};

/// Bound for a registration's conflict channel.
const CONFLICT_CHANNEL_CAPACITY: usize = 4;

/// Receiver side of a registration's conflict channel.
///
/// Delivery contract: zero, one, or both of two racing registrants may
/// receive a notice for their name. Consumers must treat every case as
/// valid; both-yield only costs transient availability.
#[derive(Debug)]
pub struct ConflictSignal {
    rx: mpsc::Receiver<WorkerName>,
}

impl ConflictSignal {
    /// Create the sender/receiver pair for one registration.
    #[must_use]
    pub fn channel() -> (mpsc::Sender<WorkerName>, Self) {
        let (tx, rx) = mpsc::channel(CONFLICT_CHANNEL_CAPACITY);
        (tx, Self { rx })
    }

    /// Await the next conflict notice. `None` once the facility has
    /// dropped this registration.
    pub async fn recv(&mut self) -> Option<WorkerName> {
        self.rx.recv().await
    }
}

/// Injected cluster-wide directory seam.
///
/// `register` publishes a proxy under a name and hands back the
/// conflict channel for that registration. `resolve` returns a live
/// proxy for the name, if any. `deregister` removes exactly the
/// caller's registration — the id disambiguates entries that coexist
/// during a race window.
#[async_trait]
pub trait NamingFacility: Send + Sync + 'static {
    /// Register `proxy` under `name`.
    async fn register(
        &self,
        name: WorkerName,
        proxy: ProxyRef,
    ) -> Result<ConflictSignal, NamingError>;

    /// Resolve `name` to a live proxy, if one is registered.
    async fn resolve(&self, name: &WorkerName) -> Option<ProxyRef>;

    /// Remove the registration `id` holds for `name`.
    async fn deregister(&self, name: &WorkerName, id: ProxyId);
}

/// Which registrants a simulated conflict is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictTarget {
    /// The earliest live registration.
    Incumbent,
    /// The most recent live registration.
    Newest,
    /// Every live registration.
    All,
}

/// Introspection record for a single registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationInfo {
    /// The registered proxy's id.
    pub proxy_id: u64,
    /// When the registration was accepted (millis since Unix epoch).
    pub registered_at_ms: i64,
}

struct Registration {
    proxy: ProxyRef,
    conflict_tx: mpsc::Sender<WorkerName>,
    registered_at_ms: i64,
}

impl Registration {
    fn is_live(&self) -> bool {
        !self.proxy.is_terminated()
    }
}

/// In-process naming backend.
///
/// `register` fails fast when the name already has a live holder in
/// this view — the synchronous-duplicate case. The asynchronous race
/// two nodes can run into is simulated by opening the partition window
/// ([`Self::set_partitioned`]): while partitioned, registrations do not
/// see each other, exactly as two directory views that have not merged
/// yet. Healing is then expressed with [`Self::inject_conflict`].
#[derive(Default)]
pub struct MemoryNaming {
    entries: RwLock<HashMap<WorkerName, Vec<Registration>>>,
    resolve_calls: AtomicU64,
    partitioned: AtomicBool,
}

impl MemoryNaming {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many `resolve` calls this facility has served.
    #[must_use]
    pub fn resolve_calls(&self) -> u64 {
        self.resolve_calls.load(Ordering::Relaxed)
    }

    /// Open or close the simulated partition window. While open,
    /// duplicate registrations are accepted instead of rejected.
    pub fn set_partitioned(&self, partitioned: bool) {
        self.partitioned.store(partitioned, Ordering::Relaxed);
    }

    /// Deliver a `ConflictDetected(name)` notice to the selected
    /// registrants of `name`, as the duplicate-key detection of a real
    /// backend would.
    pub fn inject_conflict(&self, name: &WorkerName, target: ConflictTarget) {
        self.inject_notice(name, name.clone(), target);
    }

    /// Deliver an arbitrary conflict notice to the registrants of
    /// `registrant`. Real facilities only ever deliver a registrant's
    /// own name; the arbitrary form exists to exercise handling of a
    /// misbehaving backend.
    pub fn inject_notice(
        &self,
        registrant: &WorkerName,
        notice: WorkerName,
        target: ConflictTarget,
    ) {
        let entries = self.entries.read();
        let Some(regs) = entries.get(registrant) else {
            return;
        };
        let live: Vec<&Registration> = regs.iter().filter(|r| r.is_live()).collect();
        let selected: Vec<&Registration> = match target {
            ConflictTarget::Incumbent => live
                .iter()
                .copied()
                .min_by_key(|r| r.registered_at_ms)
                .into_iter()
                .collect(),
            ConflictTarget::Newest => live
                .iter()
                .copied()
                .max_by_key(|r| r.registered_at_ms)
                .into_iter()
                .collect(),
            ConflictTarget::All => live,
        };
        for reg in selected {
            // The registrant may already be gone; nothing to do then.
            let _ = reg.conflict_tx.try_send(notice.clone());
        }
    }

    /// Snapshot of the registrations currently held for `name`.
    #[must_use]
    pub fn registrations(&self, name: &WorkerName) -> Vec<RegistrationInfo> {
        let entries = self.entries.read();
        entries
            .get(name)
            .map(|regs| {
                regs.iter()
                    .map(|r| RegistrationInfo {
                        proxy_id: r.proxy.id().0,
                        registered_at_ms: r.registered_at_ms,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl NamingFacility for MemoryNaming {
    async fn register(
        &self,
        name: WorkerName,
        proxy: ProxyRef,
    ) -> Result<ConflictSignal, NamingError> {
        let mut entries = self.entries.write();
        let regs = entries.entry(name.clone()).or_default();
        // Registrations whose proxy is gone no longer hold the name.
        regs.retain(Registration::is_live);
        if !regs.is_empty() && !self.partitioned.load(Ordering::Relaxed) {
            return Err(NamingError::AlreadyRegistered(name));
        }

        let (conflict_tx, signal) = ConflictSignal::channel();
        regs.push(Registration {
            proxy,
            conflict_tx,
            registered_at_ms: chrono::Utc::now().timestamp_millis(),
        });
        Ok(signal)
    }

    async fn resolve(&self, name: &WorkerName) -> Option<ProxyRef> {
        self.resolve_calls.fetch_add(1, Ordering::Relaxed);
        let entries = self.entries.read();
        entries
            .get(name)
            .and_then(|regs| regs.iter().find(|r| r.is_live()))
            .map(|r| r.proxy.clone())
    }

    async fn deregister(&self, name: &WorkerName, id: ProxyId) {
        let mut entries = self.entries.write();
        if let Some(regs) = entries.get_mut(name) {
            regs.retain(|r| r.proxy.id() != id);
            if regs.is_empty() {
                entries.remove(name);
            }
        }
    }
}
