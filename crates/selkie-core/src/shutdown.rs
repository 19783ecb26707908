//! Node-lifetime cancellation scope
//!
//! TigerStyle: One explicit shutdown signal, observable from any task.
//!
//! The node carries a single cancellation scope for its lifetime. The
//! first-handshake failure policy and process manager startup failures
//! cancel it; in-flight dispatches observe the cancellation and unwind.

use tokio::sync::watch;

/// Cloneable cancellation signal
///
/// `cancel` is idempotent. `cancelled` resolves for every waiter once the
/// signal has fired, including waiters that subscribe afterwards.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Create a new, un-cancelled signal
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Cancel the scope, waking all waiters
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Check whether the scope has been cancelled
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the scope is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                // All senders dropped; treat as cancelled
                return;
            }
        }
    }
}
