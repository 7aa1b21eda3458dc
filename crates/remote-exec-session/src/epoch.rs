//! Intent epochs: race-based cancellation of superseded work.
//!
//! Every connect/disconnect intent advances the epoch while holding the
//! session slot lock. Work started under an older epoch races its
//! suspension points against the epoch changing and loses to any newer
//! intent.

use std::future::Future;

use tokio::sync::watch;

/// Monotonic counter of connect/disconnect intents.
pub(crate) struct IntentEpoch {
    tx: watch::Sender<u64>,
}

impl IntentEpoch {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    /// Record a new intent and return its epoch.
    pub(crate) fn advance(&self) -> u64 {
        let mut next = 0;
        self.tx.send_modify(|epoch| {
            *epoch += 1;
            next = *epoch;
        });
        next
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        *self.tx.borrow() == epoch
    }

    /// Resolves once an intent newer than `epoch` has been recorded.
    async fn superseded(&self, epoch: u64) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on change.
        let _ = rx.wait_for(|current| *current != epoch).await;
    }

    /// Run `fut` unless a newer intent arrives first.
    ///
    /// Returns `None` if superseded; `fut` is dropped without completing.
    /// A newer intent wins ties.
    pub(crate) async fn race<F: Future>(&self, epoch: u64, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            () = self.superseded(epoch) => None,
            out = fut => Some(out),
        }
    }
}
