//! Registry conflict proxy: owns a worker, publishes it under a
//! cluster-wide name, forwards all traffic, and yields on conflict.
//!
//! One proxy task per logical name. The task processes its mailbox
//! strictly sequentially, which is what makes the write-once worker
//! handle safe without locks. A conflict notice for the proxy's own
//! name terminates it with a distinguishable reason — a deliberate,
//! logged yield, not a crash.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Duration;

use crate::error::{CallError, NamingError, StartError};
use crate::name::{NodeName, WorkerName};
use crate::naming::{ConflictSignal, NamingFacility};
use crate::worker::{WorkerExit, WorkerFactory, WorkerHandle, DEFAULT_MAILBOX_CAPACITY};

static NEXT_PROXY_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a proxy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyId(pub u64);

impl ProxyId {
    fn next() -> Self {
        Self(NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proxy-{}", self.0)
    }
}

/// Lifecycle phase of a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyPhase {
    /// Starting the worker and registering the name.
    Initializing,
    /// Registered and forwarding traffic.
    Active,
    /// Deregistering and cancelling the worker.
    Terminating,
}

impl fmt::Display for ProxyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Active => write!(f, "active"),
            Self::Terminating => write!(f, "terminating"),
        }
    }
}

/// Why a proxy task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyExit {
    /// Shutdown request, drained mailbox, or worker stopped cleanly.
    Normal,
    /// Lost a registration race and yielded the name.
    Conflict,
    /// The owned worker terminated abnormally; the failure propagated.
    WorkerFailed,
}

impl fmt::Display for ProxyExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Conflict => write!(f, "conflict"),
            Self::WorkerFailed => write!(f, "worker-failed"),
        }
    }
}

/// Messages addressed to a proxy.
#[derive(Debug)]
pub enum ProxyMsg {
    /// Request/response, forwarded to the worker verbatim.
    Call {
        /// Opaque request payload.
        payload: Bytes,
        /// Reply channel carrying the worker's verbatim reply.
        reply: oneshot::Sender<Result<Bytes, CallError>>,
    },
    /// One-way message, forwarded without acknowledgment.
    Cast {
        /// Opaque payload.
        payload: Bytes,
    },
    /// Out-of-band message, forwarded as a plain send.
    Notify {
        /// Opaque payload.
        payload: Bytes,
    },
    /// Reserved request: answered locally with the stored worker
    /// handle, never forwarded.
    GetHandle {
        /// Reply channel for the handle.
        reply: oneshot::Sender<WorkerHandle>,
    },
    /// Normal shutdown request.
    Shutdown,
}

/// Event handed to the start callback after a successful worker start.
#[derive(Debug, Clone)]
pub struct StartedEvent {
    /// The node the proxy runs on.
    pub node: NodeName,
    /// The logical name being registered.
    pub name: WorkerName,
    /// Handle of the freshly started worker.
    pub handle: WorkerHandle,
}

/// Optional callback fired once after a successful worker start.
pub type StartedCallback = Box<dyn Fn(StartedEvent) + Send + Sync>;

/// Per-proxy settings.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Identity of the local node, reported in [`StartedEvent`].
    pub local_node: NodeName,
    /// Bound for the proxy mailbox.
    pub mailbox_capacity: usize,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            local_node: NodeName::new("singlet-0@localhost"),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

/// Cheap-clone reference to a running proxy.
///
/// This is the value the naming facility stores: resolving a name
/// yields a `ProxyRef`, and every operation on it is forwarded to the
/// owned worker by the proxy task.
#[derive(Debug, Clone)]
pub struct ProxyRef {
    id: ProxyId,
    name: WorkerName,
    tx: mpsc::Sender<ProxyMsg>,
    exit: watch::Receiver<Option<ProxyExit>>,
}

impl PartialEq for ProxyRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ProxyRef {}

impl ProxyRef {
    /// The proxy's id.
    #[must_use]
    pub fn id(&self) -> ProxyId {
        self.id
    }

    /// The logical name this proxy is registered under.
    #[must_use]
    pub fn name(&self) -> &WorkerName {
        &self.name
    }

    /// Request/response through the proxy.
    ///
    /// Blocks until the worker replies; bound it with [`Self::call_timeout`]
    /// or the caller's own deadline discipline.
    pub async fn call(&self, payload: Bytes) -> Result<Bytes, CallError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ProxyMsg::Call { payload, reply })
            .await
            .map_err(|_| CallError::NotRegistered(self.name.clone()))?;
        rx.await.map_err(|_| CallError::WorkerGone)?
    }

    /// [`Self::call`] with a caller-side deadline.
    pub async fn call_timeout(
        &self,
        payload: Bytes,
        deadline: Duration,
    ) -> Result<Bytes, CallError> {
        tokio::time::timeout(deadline, self.call(payload))
            .await
            .map_err(|_| CallError::Timeout)?
    }

    /// One-way send through the proxy, no acknowledgment.
    pub async fn cast(&self, payload: Bytes) -> Result<(), CallError> {
        self.tx
            .send(ProxyMsg::Cast { payload })
            .await
            .map_err(|_| CallError::NotRegistered(self.name.clone()))
    }

    /// Out-of-band send through the proxy.
    pub async fn notify(&self, payload: Bytes) -> Result<(), CallError> {
        self.tx
            .send(ProxyMsg::Notify { payload })
            .await
            .map_err(|_| CallError::NotRegistered(self.name.clone()))
    }

    /// Reserved request: the proxy answers with its stored worker
    /// handle without forwarding anything to the worker.
    pub async fn get_handle(&self) -> Result<WorkerHandle, CallError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ProxyMsg::GetHandle { reply })
            .await
            .map_err(|_| CallError::NotRegistered(self.name.clone()))?;
        rx.await.map_err(|_| CallError::WorkerGone)
    }

    /// Request normal shutdown. Idempotent; ignores an already-stopped
    /// proxy.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(ProxyMsg::Shutdown).await;
    }

    /// Watch channel carrying the exit reason once the proxy stops.
    #[must_use]
    pub fn exit_watch(&self) -> watch::Receiver<Option<ProxyExit>> {
        self.exit.clone()
    }

    /// `true` once the proxy task has published its exit reason.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.exit.borrow().is_some()
    }
}

#[cfg(test)]
impl ProxyRef {
    /// Detached reference for naming-facility tests: no task behind it.
    pub(crate) fn stub(name: WorkerName) -> (Self, mpsc::Receiver<ProxyMsg>) {
        let (tx, rx) = mpsc::channel(DEFAULT_MAILBOX_CAPACITY);
        let (exit_tx, exit) = watch::channel(None);
        let stub = Self {
            id: ProxyId::next(),
            name,
            tx,
            exit,
        };
        // Keep the sender side alive so the stub reads as live.
        std::mem::forget(exit_tx);
        (stub, rx)
    }
}

/// Start mode: construct the worker through `factory`, register the
/// proxy under `name`, and begin forwarding.
///
/// Fail-fast contract: a failing factory surfaces synchronously, no
/// registration is attempted, and nothing is retried. A name that
/// already has a live holder in the local view fails with
/// [`StartError::AlreadyRegistered`] and the freshly started worker is
/// cancelled.
pub async fn start<N: NamingFacility>(
    name: WorkerName,
    factory: &dyn WorkerFactory,
    callback: Option<StartedCallback>,
    naming: Arc<N>,
    settings: ProxySettings,
) -> Result<ProxyRef, StartError> {
    let id = ProxyId::next();
    tracing::debug!(proxy = %id, name = %name, phase = %ProxyPhase::Initializing, "starting worker");

    let handle = factory.start().await?;
    tracing::info!(proxy = %id, name = %name, worker = %handle.id(), "worker started");

    if let Some(cb) = callback {
        cb(StartedEvent {
            node: settings.local_node.clone(),
            name: name.clone(),
            handle: handle.clone(),
        });
    }

    match bring_up(id, name, handle.clone(), naming, &settings).await {
        Ok(proxy) => Ok(proxy),
        Err(err) => {
            // The worker was never exposed; tear it down with the failure.
            handle.cancel();
            Err(err)
        }
    }
}

/// Adopt mode: take over an already-running worker and register the
/// proxy under `name`.
///
/// Establishes the bidirectional failure link: abnormal worker exit
/// terminates the proxy, and proxy termination cancels the worker. No
/// constructor runs and no callback fires.
pub async fn adopt<N: NamingFacility>(
    name: WorkerName,
    worker: WorkerHandle,
    naming: Arc<N>,
    settings: ProxySettings,
) -> Result<ProxyRef, StartError> {
    let id = ProxyId::next();
    tracing::debug!(proxy = %id, name = %name, phase = %ProxyPhase::Initializing, worker = %worker.id(), "adopting worker");
    bring_up(id, name, worker, naming, &settings).await
}

/// Register the proxy and spawn its run loop.
async fn bring_up<N: NamingFacility>(
    id: ProxyId,
    name: WorkerName,
    worker: WorkerHandle,
    naming: Arc<N>,
    settings: &ProxySettings,
) -> Result<ProxyRef, StartError> {
    let (tx, rx) = mpsc::channel(settings.mailbox_capacity.max(1));
    let (exit_tx, exit_rx) = watch::channel(None);

    let proxy = ProxyRef {
        id,
        name: name.clone(),
        tx,
        exit: exit_rx,
    };

    let conflicts = naming
        .register(name.clone(), proxy.clone())
        .await
        .map_err(|err| match err {
            NamingError::AlreadyRegistered(n) => StartError::AlreadyRegistered(n),
            other => StartError::Naming(other),
        })?;

    tokio::spawn(run(ProxyTask {
        id,
        name,
        worker,
        naming,
        rx,
        conflicts,
        exit_tx,
    }));

    Ok(proxy)
}

/// State owned by a proxy task. The worker handle is written exactly
/// once here and never replaced: on worker loss the proxy terminates
/// instead of restarting.
struct ProxyTask<N> {
    id: ProxyId,
    name: WorkerName,
    worker: WorkerHandle,
    naming: Arc<N>,
    rx: mpsc::Receiver<ProxyMsg>,
    conflicts: ConflictSignal,
    exit_tx: watch::Sender<Option<ProxyExit>>,
}

async fn run<N: NamingFacility>(mut task: ProxyTask<N>) {
    tracing::debug!(proxy = %task.id, name = %task.name, phase = %ProxyPhase::Active, "proxy active");

    let mut worker_exit = task.worker.exit_watch();
    let mut conflicts_open = true;

    let reason = loop {
        tokio::select! {
            biased;

            notice = task.conflicts.recv(), if conflicts_open => match notice {
                Some(conflicted) if conflicted == task.name => {
                    tracing::warn!(
                        proxy = %task.id,
                        name = %conflicted,
                        "registration conflict detected, yielding",
                    );
                    break ProxyExit::Conflict;
                }
                Some(foreign) => {
                    // Only a misbehaving facility delivers someone
                    // else's conflict here.
                    tracing::debug!(proxy = %task.id, name = %foreign, "ignoring conflict notice for foreign name");
                }
                None => conflicts_open = false,
            },

            _ = worker_exit.changed() => {
                let status = worker_exit.borrow_and_update().clone();
                match status {
                    Some(WorkerExit::Failed(error)) => {
                        tracing::warn!(proxy = %task.id, name = %task.name, error = %error, "worker failed");
                        break ProxyExit::WorkerFailed;
                    }
                    _ => break ProxyExit::Normal,
                }
            }

            msg = task.rx.recv() => {
                let Some(msg) = msg else { break ProxyExit::Normal };
                match msg {
                    ProxyMsg::Call { payload, reply } => {
                        // Blocks this proxy's loop until the worker
                        // replies; the caller bounds the wait.
                        let _ = reply.send(task.worker.call(payload).await);
                    }
                    ProxyMsg::Cast { payload } => {
                        let _ = task.worker.cast(payload).await;
                    }
                    ProxyMsg::Notify { payload } => {
                        let _ = task.worker.notify(payload).await;
                    }
                    ProxyMsg::GetHandle { reply } => {
                        let _ = reply.send(task.worker.clone());
                    }
                    ProxyMsg::Shutdown => break ProxyExit::Normal,
                }
            }
        }
    };

    tracing::debug!(
        proxy = %task.id,
        name = %task.name,
        phase = %ProxyPhase::Terminating,
        reason = %reason,
        "proxy terminating",
    );

    task.naming.deregister(&task.name, task.id).await;
    task.worker.cancel();
    let _ = task.exit_tx.send(Some(reason));
}
