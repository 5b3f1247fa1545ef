//! State shared between the agent's control and communication loops.
//!
//! Mutable scalars are atomics; commands travel over an unbounded FIFO whose
//! receiving end is owned by the control loop alone.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::command::Command;

/// Sentinel meaning "no pid" in the atomic pid cell.
const NO_PID: u32 = 0;
/// Sentinel meaning "no return code" in the atomic return code cell.
const NO_RETURN_CODE: i64 = i64::MIN;

/// Item on the agent-local command queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalCommand {
    /// A command received from the server.
    Apply(Command),
    /// Operator interrupt; handled like `exit`.
    Stop,
}

/// Flags and cells shared by both agent loops.
#[derive(Debug)]
pub struct SharedControlContext {
    running: AtomicBool,
    auto_restart: bool,
    pid: AtomicU32,
    return_code: AtomicI64,
    queue: mpsc::UnboundedSender<LocalCommand>,
    stopped: CancellationToken,
}

impl SharedControlContext {
    /// Create the context and the receiving end of its command queue.
    #[must_use]
    pub fn new(auto_restart: bool) -> (Arc<Self>, LocalQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(Self {
            running: AtomicBool::new(true),
            auto_restart,
            pid: AtomicU32::new(NO_PID),
            return_code: AtomicI64::new(NO_RETURN_CODE),
            queue: tx,
            stopped: CancellationToken::new(),
        });
        (ctx, LocalQueue { rx })
    }

    /// Whether the agent is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the running flag and wake anything waiting on [`stopped`](Self::stopped).
    pub fn stop_running(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stopped.cancel();
    }

    /// Resolves once [`stop_running`](Self::stop_running) was called.
    pub async fn stopped(&self) {
        self.stopped.cancelled().await;
    }

    /// Whether dead processes are restarted automatically.
    #[must_use]
    pub fn auto_restart(&self) -> bool {
        self.auto_restart
    }

    /// Last published pid of the supervised process.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::SeqCst) {
            NO_PID => None,
            pid => Some(pid),
        }
    }

    /// Publish the supervised process pid.
    pub fn set_pid(&self, pid: Option<u32>) {
        self.pid.store(pid.unwrap_or(NO_PID), Ordering::SeqCst);
    }

    /// Last published return code of the supervised process.
    #[must_use]
    pub fn return_code(&self) -> Option<i32> {
        match self.return_code.load(Ordering::SeqCst) {
            NO_RETURN_CODE => None,
            code => i32::try_from(code).ok(),
        }
    }

    /// Publish the supervised process return code.
    pub fn set_return_code(&self, code: Option<i32>) {
        self.return_code
            .store(code.map_or(NO_RETURN_CODE, i64::from), Ordering::SeqCst);
    }

    /// Push a command for the control loop.
    pub fn push(&self, command: LocalCommand) {
        if self.queue.send(command).is_err() {
            debug!(?command, "control loop gone, dropping local command");
        }
    }
}

/// Outcome of one bounded wait on the local queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueWait {
    /// A command arrived.
    Received(LocalCommand),
    /// Nothing arrived within the wait bound.
    Idle,
    /// Every sender is gone.
    Closed,
}

/// Receiving end of the local command queue.
#[derive(Debug)]
pub struct LocalQueue {
    rx: mpsc::UnboundedReceiver<LocalCommand>,
}

impl LocalQueue {
    /// Wait up to `wait` for the next command.
    pub async fn next(&mut self, wait: Duration) -> QueueWait {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(command)) => QueueWait::Received(command),
            Ok(None) => QueueWait::Closed,
            Err(_) => QueueWait::Idle,
        }
    }

    /// Drop every queued command and return how many were discarded.
    pub fn clear(&mut self) -> usize {
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }

    /// Refuse further commands; later pushes are dropped.
    pub fn close(&mut self) {
        self.rx.close();
        self.clear();
    }
}
