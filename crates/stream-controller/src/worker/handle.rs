//! Supervision handle for a spawned worker task.

use std::fmt;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::errors::ExitError;

/// Which worker a handle or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    /// Control/feedback worker.
    Control,
    /// Audio worker for realtime streams.
    RealtimeAudio,
    /// Audio worker for buffered streams.
    BufferedAudio,
}

impl WorkerKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Control => "control",
            WorkerKind::RealtimeAudio => "realtime audio",
            WorkerKind::BufferedAudio => "buffered audio",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a running worker.
///
/// The worker's task must stop when its cancellation token fires. Dropping
/// the handle does not stop the worker; call [`WorkerHandle::terminate`].
#[derive(Debug)]
pub struct WorkerHandle {
    kind: WorkerKind,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Wrap an already spawned task.
    #[must_use]
    pub fn new(kind: WorkerKind, cancel_token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            kind,
            cancel_token,
            task,
        }
    }

    /// Spawn `worker` on the current runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(kind: WorkerKind, cancel_token: CancellationToken, worker: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(worker);
        Self::new(kind, cancel_token, task)
    }

    #[must_use]
    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    /// Whether the worker task has already exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the worker to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Ask the worker to stop and wait for it to exit.
    ///
    /// Blocks until the task completes; a worker that ignores its token keeps
    /// this pending.
    pub async fn terminate(self) -> Result<(), ExitError> {
        let kind = self.kind;
        self.cancel_token.cancel();

        self.task.await.map_err(|e| ExitError {
            worker: kind,
            reason: if e.is_panic() {
                "worker panicked".to_string()
            } else {
                e.to_string()
            },
        })
    }
}
