//! One-shot lifecycle signals.
//!
//! A [`Signal`] is a boolean raised at most once per lifecycle, awaited by
//! any number of suspended tasks, and lowered only at cycle end. Raising is
//! idempotent and commutes with concurrent reads.

use tokio::sync::watch;

/// Idempotent one-shot flag with an awaitable edge.
#[derive(Debug)]
pub struct Signal {
    tx: watch::Sender<bool>,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Raise the flag. Returns whether this call raised it (repeat calls are
    /// no-ops).
    pub fn raise(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_raised(&self) -> bool {
        *self.tx.borrow()
    }

    /// Suspend until the flag is raised; returns immediately if it already is.
    pub async fn raised(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so the channel cannot close mid-wait.
        let _ = rx.wait_for(|raised| *raised).await;
    }

    /// Lower the flag at cycle end.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }
}
