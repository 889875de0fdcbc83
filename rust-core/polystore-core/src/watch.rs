// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Key watcher: a rendezvous object letting readers block until a key
// appears.
//
// Readers register under the database lock, release the lock, then await
// their ticket; writers notify after inserting. Because registration
// happens synchronously while the reader still holds the database lock, a
// writer that acquires the write lock afterwards cannot miss the waiter.
// Wake-ups are advisory: the reader must re-check the store from scratch,
// since several writers may race.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

/// Outcome of a watcher wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A notify was delivered; re-check the store.
    Present,
    /// The caller's timeout elapsed first.
    TimedOut,
}

/// A registration handed out by [`KeyWatcher::add_key`].
///
/// Awaiting the ticket consumes it; dropping it without waiting leaves a
/// dead sender that the next timeout sweep removes.
pub struct WaitTicket {
    rx: oneshot::Receiver<()>,
}

/// Per-database table of `key -> wait queue`.
///
/// Every entry holds at least one waiter; queues are removed as soon as they
/// empty (on notify, or by the sweep a timed-out waiter performs).
#[derive(Default)]
pub struct KeyWatcher {
    waiters: Mutex<HashMap<Vec<u8>, Vec<oneshot::Sender<()>>>>,
}

impl KeyWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register intent to wait on `key`.
    ///
    /// Must be called while the caller still holds the database lock, so
    /// that the registration is observable before the lock is released.
    pub fn add_key(&self, key: &[u8]) -> WaitTicket {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .expect("watcher table poisoned")
            .entry(key.to_vec())
            .or_default()
            .push(tx);
        WaitTicket { rx }
    }

    /// Suspend until the ticket's key is notified or `timeout` elapses.
    ///
    /// The caller must have released the database lock first, and must
    /// retry its lookup after a `Present` outcome.
    pub async fn wait_key(&self, key: &[u8], ticket: WaitTicket, timeout: Duration) -> WaitOutcome {
        match tokio::time::timeout(timeout, ticket.rx).await {
            Ok(Ok(())) => WaitOutcome::Present,
            // The sender vanished without firing (queue dropped); treat as a
            // wake so the caller re-checks rather than sleeping forever.
            Ok(Err(_)) => WaitOutcome::Present,
            Err(_) => {
                self.sweep(key);
                WaitOutcome::TimedOut
            }
        }
    }

    /// Wake every waiter on `key` and drop its queue.
    pub fn notify_key(&self, key: &[u8]) {
        let queue = self
            .waiters
            .lock()
            .expect("watcher table poisoned")
            .remove(key);
        if let Some(queue) = queue {
            for tx in queue {
                // A receiver that timed out between registration and now is
                // simply gone; ignore it.
                let _ = tx.send(());
            }
        }
    }

    /// Number of keys currently watched.
    pub fn watched_keys(&self) -> usize {
        self.waiters.lock().expect("watcher table poisoned").len()
    }

    /// Drop closed registrations for `key`, removing the queue if emptied.
    fn sweep(&self, key: &[u8]) {
        let mut table = self.waiters.lock().expect("watcher table poisoned");
        if let Some(queue) = table.get_mut(key) {
            queue.retain(|tx| !tx.is_closed());
            if queue.is_empty() {
                table.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_notify_wakes_waiter() {
        let watcher = Arc::new(KeyWatcher::new());
        let ticket = watcher.add_key(b"k");
        assert_eq!(watcher.watched_keys(), 1);

        let waiter = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move {
                watcher
                    .wait_key(b"k", ticket, Duration::from_secs(5))
                    .await
            })
        };

        // Give the waiter a chance to park before notifying.
        tokio::task::yield_now().await;
        watcher.notify_key(b"k");

        assert_eq!(waiter.await.unwrap(), WaitOutcome::Present);
        assert_eq!(watcher.watched_keys(), 0);
    }

    #[tokio::test]
    async fn test_notify_wakes_all_waiters() {
        let watcher = Arc::new(KeyWatcher::new());
        let tickets: Vec<_> = (0..3).map(|_| watcher.add_key(b"shared")).collect();

        let mut tasks = Vec::new();
        for ticket in tickets {
            let watcher = Arc::clone(&watcher);
            tasks.push(tokio::spawn(async move {
                watcher
                    .wait_key(b"shared", ticket, Duration::from_secs(5))
                    .await
            }));
        }

        tokio::task::yield_now().await;
        watcher.notify_key(b"shared");

        for task in tasks {
            assert_eq!(task.await.unwrap(), WaitOutcome::Present);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_sweeps_registration() {
        let watcher = KeyWatcher::new();
        let ticket = watcher.add_key(b"absent");
        let outcome = watcher
            .wait_key(b"absent", ticket, Duration::from_millis(10))
            .await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(watcher.watched_keys(), 0);
    }

    #[tokio::test]
    async fn test_notify_without_waiters_is_noop() {
        let watcher = KeyWatcher::new();
        watcher.notify_key(b"nobody");
        assert_eq!(watcher.watched_keys(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_cross_wake() {
        let watcher = Arc::new(KeyWatcher::new());
        let ticket_a = watcher.add_key(b"a");

        watcher.notify_key(b"b");
        assert_eq!(watcher.watched_keys(), 1);

        watcher.notify_key(b"a");
        let outcome = watcher
            .wait_key(b"a", ticket_a, Duration::from_secs(1))
            .await;
        assert_eq!(outcome, WaitOutcome::Present);
    }
}
