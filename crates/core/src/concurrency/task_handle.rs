use std::any::Any;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use thiserror::Error;

/// Why a submitted task produced no value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task was discarded before it ran")]
    Discarded,
}

pub type TaskResult<R> = Result<R, TaskError>;

/// Receiving end of a task submitted to the worker pool.
///
/// Dropping the handle detaches from the result; the task still runs.
pub struct TaskHandle<R> {
    receiver: Receiver<TaskResult<R>>,
}

impl<R> TaskHandle<R> {
    pub(crate) fn new(receiver: Receiver<TaskResult<R>>) -> Self {
        Self { receiver }
    }

    /// Blocks until the task finishes or is discarded.
    pub fn wait(self) -> TaskResult<R> {
        self.receiver.recv().unwrap_or(Err(TaskError::Discarded))
    }

    /// Blocks for at most `timeout`; `None` means still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskResult<R>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(TaskError::Discarded)),
        }
    }

    /// Non-blocking poll; `None` means still pending.
    pub fn try_result(&self) -> Option<TaskResult<R>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TaskError::Discarded)),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
