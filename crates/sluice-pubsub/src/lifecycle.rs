//! Subscriber-wide lifecycle: closing broadcast and task tracking.
//!
//! One [`Lifecycle`] is owned per subscriber instance. It holds the closed
//! flag (transitions exactly once, via compare-and-swap), a `watch`-channel
//! closing broadcast every pipeline selects on, and a wait-group built from
//! a guard channel: each pipeline task holds a [`TaskGuard`] wrapping a
//! sender clone, and [`Lifecycle::shutdown`] completes once every guard has
//! been dropped (`recv()` returns `None` after the last sender goes away).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::{mpsc, watch};

/// Keeps one pipeline task registered with its subscriber's lifecycle.
///
/// Dropped when the task exits; shutdown waits for all guards to drop.
pub(crate) struct TaskGuard {
    _permit: mpsc::Sender<()>,
}

/// Per-subscriber shutdown state.
pub(crate) struct Lifecycle {
    closed: AtomicBool,
    closing: watch::Sender<bool>,
    guards: Mutex<Option<mpsc::Sender<()>>>,
    drained: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (closing, _) = watch::channel(false);
        // Guard senders are never sent on; only their drop matters.
        let (guard_tx, guard_rx) = mpsc::channel(1);
        Self {
            closed: AtomicBool::new(false),
            closing,
            guards: Mutex::new(Some(guard_tx)),
            drained: tokio::sync::Mutex::new(guard_rx),
        }
    }

    /// Whether shutdown has begun.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// A receiver for the closing broadcast.
    pub(crate) fn closing(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }

    /// Register a pipeline task. Returns `None` once shutdown has begun,
    /// so no task can start after `shutdown` stopped waiting for guards.
    pub(crate) fn register(&self) -> Option<TaskGuard> {
        let guards = self.guards.lock().expect("lifecycle guard lock poisoned");
        guards.as_ref().map(|tx| TaskGuard { _permit: tx.clone() })
    }

    /// Begin shutdown and wait for every registered task to exit.
    ///
    /// Exactly one caller wins the compare-and-swap and performs teardown;
    /// it returns `true` after the last guard drops. All other callers
    /// return `false` immediately.
    pub(crate) async fn shutdown(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.closing.send_replace(true);

        // Drop the master sender so the guard channel can fully close.
        self.guards
            .lock()
            .expect("lifecycle guard lock poisoned")
            .take();

        let mut drained = self.drained.lock().await;
        while drained.recv().await.is_some() {}
        true
    }
}

/// Resolve once the closing broadcast fires.
///
/// A dropped sender means the subscriber itself is gone; treat that as
/// closing too rather than erroring out of a select loop.
pub(crate) async fn closed_signal(closing: &mut watch::Receiver<bool>) {
    let _ = closing.wait_for(|closed| *closed).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_shutdown_wins_once() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.shutdown().await);
        assert!(!lifecycle.shutdown().await);
        assert!(lifecycle.is_closed());
    }

    #[tokio::test]
    async fn test_concurrent_shutdown_single_winner() {
        let lifecycle = Arc::new(Lifecycle::new());
        let a = tokio::spawn({
            let lifecycle = Arc::clone(&lifecycle);
            async move { lifecycle.shutdown().await }
        });
        let b = tokio::spawn({
            let lifecycle = Arc::clone(&lifecycle);
            async move { lifecycle.shutdown().await }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a ^ b, "exactly one caller performs teardown");
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_guards() {
        let lifecycle = Arc::new(Lifecycle::new());
        let guard = lifecycle.register().expect("not closed yet");

        let mut closing = lifecycle.closing();
        let task = tokio::spawn(async move {
            closed_signal(&mut closing).await;
            // Simulate the pipeline doing a final bit of work before exiting.
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });

        timeout(Duration::from_secs(1), lifecycle.shutdown())
            .await
            .expect("shutdown must not hang once guards drop");
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_register_refused_after_shutdown() {
        let lifecycle = Lifecycle::new();
        lifecycle.shutdown().await;
        assert!(lifecycle.register().is_none());
    }
}
