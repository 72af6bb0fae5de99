//! Shutdown coordination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Broadcasts a single shutdown notification to every long-running task
/// (listeners, sweeper, config reload loop).
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Later calls are no-ops.
    pub fn trigger(&self, reason: &str) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(reason, subscribers = self.tx.receiver_count(), "Shutdown triggered");
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for `tasks` to finish, giving up after `deadline`.
/// Returns `false` if the deadline hit first.
pub async fn drain<T>(tasks: Vec<JoinHandle<T>>, deadline: Duration) -> bool {
    let all = async {
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Task ended abnormally during shutdown");
            }
        }
    };
    match tokio::time::timeout(deadline, all).await {
        Ok(()) => true,
        Err(_) => {
            tracing::warn!(deadline_secs = deadline.as_secs(), "Shutdown deadline exceeded");
            false
        }
    }
}
