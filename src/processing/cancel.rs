//! Caller-side cancellation of a running pipeline.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

/// Cancellation state observed by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelSignal {
    /// Keep going.
    Running,
    /// Stop outstanding tasks but keep and merge completed results.
    Graceful,
    /// Abort every task and fail the run.
    Hard,
}

/// Cloneable handle used to cancel a run from outside (signal handlers, deadlines, UIs).
///
/// Signals only escalate: once `Hard` has been sent, `cancel` has no effect.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    sender: Arc<watch::Sender<CancelSignal>>,
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationHandle {
    /// Create a handle in the `Running` state.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(CancelSignal::Running);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Request graceful cancellation.
    pub fn cancel(&self) {
        self.escalate(CancelSignal::Graceful);
    }

    /// Request hard cancellation.
    pub fn abort(&self) {
        self.escalate(CancelSignal::Hard);
    }

    /// Current signal.
    pub fn signal(&self) -> CancelSignal {
        *self.sender.borrow()
    }

    /// Whether any cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.signal() != CancelSignal::Running
    }

    /// Receiver that observes subsequent signals.
    pub fn subscribe(&self) -> watch::Receiver<CancelSignal> {
        self.sender.subscribe()
    }

    fn escalate(&self, signal: CancelSignal) {
        self.sender.send_if_modified(|current| {
            if signal > *current {
                *current = signal;
                true
            } else {
                false
            }
        });
    }
}
