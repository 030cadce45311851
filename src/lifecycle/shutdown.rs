//! Shutdown coordination for the gateway.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

/// Broadcasts a one-shot stop signal to the server and background tasks.
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

    /// Receiver that completes once [`Shutdown::trigger`] is called.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Later calls are no-ops.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(());
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_notified_once() {
        let shutdown = Shutdown::new();
        let mut first = shutdown.subscribe();
        let mut second = shutdown.subscribe();

        assert!(!shutdown.is_triggered());
        shutdown.trigger();
        shutdown.trigger();

        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
        assert!(second.try_recv().is_err());
        assert!(shutdown.is_triggered());
    }
}
