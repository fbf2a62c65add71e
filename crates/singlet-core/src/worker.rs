//! Worker tasks with exclusive ownership (no `Arc<Mutex>`).
//!
//! A worker runs in its own tokio task and processes its mailbox
//! strictly sequentially. The [`WorkerHandle`] is the only way to
//! address it; termination is observable through a `watch` channel
//! and forced through a `CancellationToken`.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{CallError, StartError};

/// Default bound for a worker mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Unique identifier for a worker unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Messages a worker receives after the proxy strips reserved traffic.
#[derive(Debug)]
pub enum WorkerMsg {
    /// Request/response: the worker must answer on `reply`.
    Call {
        /// Opaque request payload.
        payload: Bytes,
        /// Reply channel back to the caller.
        reply: oneshot::Sender<Bytes>,
    },
    /// One-way message, no acknowledgment.
    Cast {
        /// Opaque payload.
        payload: Bytes,
    },
    /// Out-of-band message (timers, async notifications), no reply.
    Notify {
        /// Opaque payload.
        payload: Bytes,
    },
}

/// How a worker task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Mailbox drained or cancellation requested.
    Normal,
    /// A handler returned an error; the worker is considered crashed.
    Failed(String),
}

/// Cheap-clone handle addressing a running worker task.
///
/// Equality is by worker id, so a handle that travelled through the
/// proxy layer compares equal to the original.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    id: WorkerId,
    tx: mpsc::Sender<WorkerMsg>,
    exit: watch::Receiver<Option<WorkerExit>>,
    cancel: CancellationToken,
}

impl PartialEq for WorkerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WorkerHandle {}

impl WorkerHandle {
    /// The worker's id.
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Request/response directly against the worker, bypassing any proxy.
    pub async fn call(&self, payload: Bytes) -> Result<Bytes, CallError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerMsg::Call { payload, reply })
            .await
            .map_err(|_| CallError::WorkerGone)?;
        rx.await.map_err(|_| CallError::WorkerGone)
    }

    /// One-way send, no acknowledgment.
    pub async fn cast(&self, payload: Bytes) -> Result<(), CallError> {
        self.tx
            .send(WorkerMsg::Cast { payload })
            .await
            .map_err(|_| CallError::WorkerGone)
    }

    /// Out-of-band send, no reply expected.
    pub async fn notify(&self, payload: Bytes) -> Result<(), CallError> {
        self.tx
            .send(WorkerMsg::Notify { payload })
            .await
            .map_err(|_| CallError::WorkerGone)
    }

    /// Watch channel carrying the exit status once the task stops.
    #[must_use]
    pub fn exit_watch(&self) -> watch::Receiver<Option<WorkerExit>> {
        self.exit.clone()
    }

    /// `true` once the worker task has published its exit status.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.exit.borrow().is_some()
    }

    /// Request cooperative termination of the worker task.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Domain logic driven by a worker task.
///
/// Handlers run strictly sequentially. Returning `Err` from any handler
/// terminates the worker abnormally ([`WorkerExit::Failed`]).
#[async_trait]
pub trait WorkerBehavior: Send + 'static {
    /// Handle a request and produce the reply payload.
    async fn on_call(&mut self, payload: Bytes) -> Result<Bytes, String>;

    /// Handle a one-way message.
    async fn on_cast(&mut self, payload: Bytes) -> Result<(), String>;

    /// Handle an out-of-band message. Defaults to ignoring it.
    async fn on_notify(&mut self, _payload: Bytes) -> Result<(), String> {
        Ok(())
    }
}

/// Constructor seam for start-mode proxies: produces a running worker.
#[async_trait]
pub trait WorkerFactory: Send + Sync {
    /// Start the worker and return its handle, or fail fast.
    async fn start(&self) -> Result<WorkerHandle, StartError>;
}

#[async_trait]
impl<F> WorkerFactory for F
where
    F: Fn() -> Result<WorkerHandle, StartError> + Send + Sync,
{
    async fn start(&self) -> Result<WorkerHandle, StartError> {
        (self)()
    }
}

/// Spawns a worker task driving `behavior` and returns its handle.
///
/// The task exits normally when cancelled or when every sender is gone,
/// and abnormally when a handler returns an error. The exit status is
/// published on the handle's watch channel either way.
#[must_use]
pub fn spawn_worker(id: WorkerId, mut behavior: Box<dyn WorkerBehavior>) -> WorkerHandle {
    let (tx, mut rx) = mpsc::channel(DEFAULT_MAILBOX_CAPACITY);
    let (exit_tx, exit_rx) = watch::channel(None);
    let cancel = CancellationToken::new();
    let cancel_rx = cancel.clone();

    tokio::spawn(async move {
        tracing::debug!(worker = %id, "worker task started");

        let status = loop {
            tokio::select! {
                biased;

                () = cancel_rx.cancelled() => break WorkerExit::Normal,

                msg = rx.recv() => {
                    let Some(msg) = msg else { break WorkerExit::Normal };
                    match msg {
                        WorkerMsg::Call { payload, reply } => {
                            match behavior.on_call(payload).await {
                                Ok(resp) => {
                                    // Requester may have given up; that is its business.
                                    let _ = reply.send(resp);
                                }
                                Err(reason) => {
                                    tracing::warn!(worker = %id, error = %reason, "call handler failed");
                                    break WorkerExit::Failed(reason);
                                }
                            }
                        }
                        WorkerMsg::Cast { payload } => {
                            if let Err(reason) = behavior.on_cast(payload).await {
                                tracing::warn!(worker = %id, error = %reason, "cast handler failed");
                                break WorkerExit::Failed(reason);
                            }
                        }
                        WorkerMsg::Notify { payload } => {
                            if let Err(reason) = behavior.on_notify(payload).await {
                                tracing::warn!(worker = %id, error = %reason, "notify handler failed");
                                break WorkerExit::Failed(reason);
                            }
                        }
                    }
                }
            }
        };

        let _ = exit_tx.send(Some(status));
        tracing::debug!(worker = %id, "worker task stopped");
    });

    WorkerHandle {
        id,
        tx,
        exit: exit_rx,
        cancel,
    }
}
