//! # singlet-core
//!
//! Cluster-wide singleton worker placement: for a logical name, exactly
//! one worker should exist across the cooperating nodes, reachable by
//! name from any of them.
//!
//! - [`proxy`] — the registry conflict proxy: owns a worker, registers
//!   it under a [`WorkerName`], forwards all traffic transparently, and
//!   yields (terminates itself and its worker) on a conflict notice.
//! - [`naming`] — the injected cluster directory seam, plus the
//!   in-process [`MemoryNaming`] backend.
//! - [`worker`] — the worker task contract: mailbox, behavior trait,
//!   factory seam, failure observation.
//! - [`resolve`] — name → handle lookup with the `Undefined` sentinel.
//!
//! ## Design principles
//!
//! - **One task per proxy**: each proxy processes its mailbox strictly
//!   sequentially, so its worker handle is written once and read
//!   without locks.
//! - **Arbitrate existence, not state**: conflicts are resolved by
//!   yielding, never by retrying or renegotiating. Both racers yielding
//!   is safe; it only costs transient availability.
//! - **No restart logic**: worker failures propagate to the proxy's own
//!   lifecycle. Restart policy belongs to a supervising layer above.

pub mod error;
pub mod name;
pub mod naming;
pub mod proxy;
pub mod resolve;
pub mod worker;

pub use error::{CallError, NamingError, StartError};
pub use name::{NodeName, WorkerName};
pub use naming::{ConflictSignal, ConflictTarget, MemoryNaming, NamingFacility};
pub use proxy::{
    adopt, start, ProxyExit, ProxyId, ProxyPhase, ProxyRef, ProxySettings, StartedCallback,
    StartedEvent,
};
pub use resolve::{resolve, ResolveKey};
pub use worker::{
    spawn_worker, WorkerBehavior, WorkerExit, WorkerFactory, WorkerHandle, WorkerId, WorkerMsg,
};
