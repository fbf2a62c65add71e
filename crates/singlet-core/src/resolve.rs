//! Client-side lookup: logical name → worker handle.
//!
//! `Undefined` is a value, not an error: it means "no such
//! registration" and passes through lookup untouched, before any
//! naming-facility call is made.

use crate::name::WorkerName;
use crate::naming::NamingFacility;
use crate::worker::WorkerHandle;

/// A lookup key, or the result of a lookup.
///
/// Already-resolved handles pass through unchanged, so
/// `resolve(resolve(key))` is a fixpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveKey {
    /// No such registration. Short-circuits lookup.
    Undefined,
    /// An already-resolved worker handle; returned unchanged.
    Handle(WorkerHandle),
    /// A logical name to look up in the naming facility.
    Name(WorkerName),
}

impl ResolveKey {
    /// `true` for the `Undefined` sentinel.
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// The handle, if this key resolved to one.
    #[must_use]
    pub fn into_handle(self) -> Option<WorkerHandle> {
        match self {
            Self::Handle(handle) => Some(handle),
            Self::Undefined | Self::Name(_) => None,
        }
    }
}

impl From<WorkerHandle> for ResolveKey {
    fn from(handle: WorkerHandle) -> Self {
        Self::Handle(handle)
    }
}

impl From<WorkerName> for ResolveKey {
    fn from(name: WorkerName) -> Self {
        Self::Name(name)
    }
}

impl From<&str> for ResolveKey {
    fn from(name: &str) -> Self {
        Self::Name(WorkerName::new(name))
    }
}

/// Resolve `key` to a worker handle.
///
/// `Undefined` returns `Undefined` with zero facility calls; a handle
/// returns unchanged. A name is looked up through the facility and the
/// registered proxy is asked for its handle with the reserved request;
/// a name nobody answers for resolves to `Undefined`.
pub async fn resolve<N: NamingFacility>(key: ResolveKey, naming: &N) -> ResolveKey {
    match key {
        ResolveKey::Undefined => ResolveKey::Undefined,
        ResolveKey::Handle(handle) => ResolveKey::Handle(handle),
        ResolveKey::Name(name) => match naming.resolve(&name).await {
            None => ResolveKey::Undefined,
            Some(proxy) => match proxy.get_handle().await {
                Ok(handle) => ResolveKey::Handle(handle),
                // The proxy terminated between resolve and the reserved
                // request; to this caller the name is simply gone.
                Err(_) => ResolveKey::Undefined,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::MemoryNaming;

    #[tokio::test]
    async fn test_undefined_short_circuits() {
        let naming = MemoryNaming::new();
        let resolved = resolve(ResolveKey::Undefined, &naming).await;
        assert!(resolved.is_undefined());
        assert_eq!(naming.resolve_calls(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_name_is_undefined() {
        let naming = MemoryNaming::new();
        let resolved = resolve("nobody-home".into(), &naming).await;
        assert!(resolved.is_undefined());
        assert_eq!(naming.resolve_calls(), 1);
    }

    #[tokio::test]
    async fn test_handle_passes_through_without_facility_calls() {
        use crate::worker::{spawn_worker, WorkerBehavior, WorkerId};

        struct Idle;

        #[async_trait::async_trait]
        impl WorkerBehavior for Idle {
            async fn on_call(&mut self, payload: bytes::Bytes) -> Result<bytes::Bytes, String> {
                Ok(payload)
            }

            async fn on_cast(&mut self, _payload: bytes::Bytes) -> Result<(), String> {
                Ok(())
            }
        }

        let naming = MemoryNaming::new();
        let handle = spawn_worker(WorkerId(1), Box::new(Idle));
        let resolved = resolve(handle.clone().into(), &naming).await;
        assert_eq!(resolved, ResolveKey::Handle(handle));
        assert_eq!(naming.resolve_calls(), 0);
    }
}
