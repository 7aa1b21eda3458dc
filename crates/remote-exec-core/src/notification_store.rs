//! Broadcast + history notification store.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{Notification, SessionObserver};

/// Default history size limit (1 MB).
const HISTORY_BYTES: usize = 1024 * 1024;

/// Default broadcast capacity.
const DEFAULT_CAPACITY: usize = 1024;

struct StoredNotification {
    notification: Notification,
    bytes: usize,
}

struct Inner {
    history: VecDeque<StoredNotification>,
    total_bytes: usize,
}

/// Observer that fans notifications out to live listeners and keeps a
/// bounded history.
///
/// Late subscribers (a UI that reconnects) replay the history and then
/// follow live updates.
pub struct NotificationStore {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<Notification>,
    history_limit: usize,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    /// Create a store with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, HISTORY_BYTES)
    }

    /// Create a store with an explicit broadcast capacity and history budget.
    #[must_use]
    pub fn with_limits(capacity: usize, history_limit: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: RwLock::new(Inner {
                history: VecDeque::with_capacity(32),
                total_bytes: 0,
            }),
            sender,
            history_limit,
        }
    }

    /// Push a notification to both live listeners and history.
    pub fn push(&self, notification: Notification) {
        let _ = self.sender.send(notification.clone());
        let bytes = notification.approx_bytes();

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        while inner.total_bytes.saturating_add(bytes) > self.history_limit {
            if let Some(front) = inner.history.pop_front() {
                inner.total_bytes = inner.total_bytes.saturating_sub(front.bytes);
            } else {
                break;
            }
        }
        inner.history.push_back(StoredNotification {
            notification,
            bytes,
        });
        inner.total_bytes = inner.total_bytes.saturating_add(bytes);
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Get a snapshot of the history.
    #[must_use]
    pub fn history(&self) -> Vec<Notification> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .iter()
            .map(|s| s.notification.clone())
            .collect()
    }

    /// Stream that yields history first, then live updates.
    ///
    /// Lagged live updates are skipped.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, Notification> {
        let (history, rx) = (self.history(), self.subscribe());

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(hist.chain(live))
    }
}

impl SessionObserver for NotificationStore {
    fn notify(&self, notification: Notification) {
        tracing::trace!(?notification, "session notification");
        self.push(notification);
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn console(line: &str) -> Notification {
        Notification::Console {
            workspace: "playground".to_string(),
            line: line.to_string(),
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let store = NotificationStore::with_limits(16, 200);
        for i in 0..10 {
            store.push(console(&format!("line {i}")));
        }
        let history = store.history();
        assert!(history.len() < 10);
        assert_eq!(history.last(), Some(&console("line 9")));
    }

    #[tokio::test]
    async fn test_history_then_live() {
        let store = NotificationStore::new();
        store.push(console("before"));

        let mut stream = store.history_plus_stream();
        store.push(console("after"));

        assert_eq!(stream.next().await, Some(console("before")));
        assert_eq!(stream.next().await, Some(console("after")));
    }

    #[test]
    fn test_stream_waits_for_live_updates() {
        let store = NotificationStore::new();
        store.push(console("before"));
        let mut stream = tokio_test::task::spawn(store.history_plus_stream());

        tokio_test::assert_ready_eq!(stream.poll_next(), Some(console("before")));
        tokio_test::assert_pending!(stream.poll_next());

        store.push(console("after"));
        assert!(stream.is_woken());
        tokio_test::assert_ready_eq!(stream.poll_next(), Some(console("after")));
    }
}
