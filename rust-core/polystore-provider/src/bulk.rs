// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Pooled staging buffers.
//
// Every bulk handler stages its whole request image in one buffer from this
// pool. The pool is bounded: when all permits are out, `get` suspends until
// another handler finishes. Buffers return to the pool when the
// `PooledBuffer` drops, on every exit path.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use polystore_core::{KvError, KvResult};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct PoolInner {
    buffers: Mutex<Vec<Vec<u8>>>,
    sem: Arc<Semaphore>,
}

/// A bounded pool of reusable staging buffers.
#[derive(Clone)]
pub struct BulkPool {
    inner: Arc<PoolInner>,
}

impl BulkPool {
    /// Default number of concurrently outstanding buffers.
    pub const DEFAULT_CAPACITY: usize = 16;

    /// Create a pool handing out at most `capacity` buffers at a time.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                buffers: Mutex::new(Vec::new()),
                sem: Arc::new(Semaphore::new(capacity.max(1))),
            }),
        }
    }

    /// Acquire a buffer of at least `size` bytes, suspending if the pool is
    /// exhausted. The returned buffer is zero-filled up to `size`.
    pub async fn get(&self, size: usize) -> KvResult<PooledBuffer> {
        let permit = Arc::clone(&self.inner.sem)
            .acquire_owned()
            .await
            .map_err(|_| KvError::Aborted)?;
        let mut data = self
            .inner
            .buffers
            .lock()
            .expect("bulk pool poisoned")
            .pop()
            .unwrap_or_default();
        data.clear();
        data.resize(size, 0);
        Ok(PooledBuffer {
            data,
            inner: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Number of idle buffers currently parked in the pool.
    pub fn idle(&self) -> usize {
        self.inner.buffers.lock().expect("bulk pool poisoned").len()
    }
}

impl Default for BulkPool {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// A staging buffer checked out of a [`BulkPool`].
///
/// Dereferences to its byte contents; returns to the pool on drop.
pub struct PooledBuffer {
    data: Vec<u8>,
    inner: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.inner
            .buffers
            .lock()
            .expect("bulk pool poisoned")
            .push(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_buffers_are_reused() {
        let pool = BulkPool::new(2);
        {
            let mut buf = pool.get(64).await.unwrap();
            buf[0] = 0xAB;
            assert_eq!(buf.len(), 64);
        }
        assert_eq!(pool.idle(), 1);
        // The recycled buffer comes back zeroed at the requested size.
        let buf = pool.get(16).await.unwrap();
        assert_eq!(buf.len(), 16);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn test_exhausted_pool_suspends_until_release() {
        let pool = BulkPool::new(1);
        let held = pool.get(8).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get(8).await.unwrap().len() })
        };
        // The waiter cannot make progress while the buffer is held.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap(), 8);
    }
}
