use std::sync::Arc;
use tokio::sync::watch;

/// Cancellation signal for a transfer.
///
/// Clones observe the same signal. Workers race every part request against
/// it; an in-flight call is abandoned and its chunk reports a terminal
/// `Cancelled` error.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Trip the signal. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Whether the signal has been tripped.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal trips.
    pub(crate) async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Never fails: we hold a sender for the token's whole lifetime.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
