// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Bulk-region interface.
//
// The transport is an external collaborator: it delivers RPC arguments and
// exposes the client's registered memory as a region the server can pull
// from and push into. Handlers only ever see this trait. `SharedRegion` is
// the in-process implementation used by tests and co-located clients.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use polystore_core::{KvError, KvResult};

/// One-sided access to a remote memory region.
#[async_trait]
pub trait BulkRegion: Send + Sync {
    /// Total size of the region in bytes.
    fn len(&self) -> usize;

    /// True if the region is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `dst.len()` bytes starting at `offset` out of the region.
    async fn pull(&self, offset: usize, dst: &mut [u8]) -> KvResult<()>;

    /// Copy `src` into the region starting at `offset`.
    async fn push(&self, offset: usize, src: &[u8]) -> KvResult<()>;
}

/// An in-process bulk region over shared memory.
#[derive(Clone)]
pub struct SharedRegion {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedRegion {
    /// Wrap `bytes` as a region.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(bytes)),
        }
    }

    /// Allocate a zeroed region of `size` bytes.
    pub fn zeroed(size: usize) -> Self {
        Self::new(vec![0; size])
    }

    /// A copy of the region's current contents.
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().expect("region poisoned").clone()
    }
}

#[async_trait]
impl BulkRegion for SharedRegion {
    fn len(&self) -> usize {
        self.bytes.lock().expect("region poisoned").len()
    }

    async fn pull(&self, offset: usize, dst: &mut [u8]) -> KvResult<()> {
        let bytes = self.bytes.lock().expect("region poisoned");
        let end = offset
            .checked_add(dst.len())
            .filter(|&e| e <= bytes.len())
            .ok_or_else(|| {
                KvError::FromTransport(format!(
                    "pull of {} bytes at {offset} exceeds region of {}",
                    dst.len(),
                    bytes.len()
                ))
            })?;
        dst.copy_from_slice(&bytes[offset..end]);
        Ok(())
    }

    async fn push(&self, offset: usize, src: &[u8]) -> KvResult<()> {
        let mut bytes = self.bytes.lock().expect("region poisoned");
        let end = offset
            .checked_add(src.len())
            .filter(|&e| e <= bytes.len())
            .ok_or_else(|| {
                KvError::FromTransport(format!(
                    "push of {} bytes at {offset} exceeds region of {}",
                    src.len(),
                    bytes.len()
                ))
            })?;
        bytes[offset..end].copy_from_slice(src);
        Ok(())
    }
}
