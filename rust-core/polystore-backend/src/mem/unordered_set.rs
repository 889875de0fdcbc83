// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Hashed in-memory set backend. Keys only, no listings, no blocking waits.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use polystore_core::{batch, BitField, KvError, KvResult, Mode, OutBuf, KEY_NOT_FOUND};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::backend::DatabaseBackend;
use crate::mem::{complete_allocators, complete_bucket_count, complete_use_lock, config_object};

/// Hashed set backend (`"unordered_set"`).
pub struct UnorderedSetBackend {
    config: Value,
    db: RwLock<HashSet<Vec<u8>>>,
}

impl UnorderedSetBackend {
    /// Create a backend from its JSON config, filling in defaults.
    pub fn open(config: &Value) -> KvResult<Arc<dyn DatabaseBackend>> {
        let mut cfg = config_object(config)?;
        complete_use_lock(&mut cfg)?;
        let buckets = complete_bucket_count(&mut cfg)?;
        complete_allocators(&mut cfg)?;
        Ok(Arc::new(Self {
            config: Value::Object(cfg),
            db: RwLock::new(HashSet::with_capacity(buckets)),
        }))
    }
}

#[async_trait]
impl DatabaseBackend for UnorderedSetBackend {
    fn name(&self) -> &str {
        "unordered_set"
    }

    fn config(&self) -> Value {
        self.config.clone()
    }

    fn supported_modes(&self) -> Mode {
        // As with the hashed map: no listing bits and no WAIT/NOTIFY.
        Mode::APPEND | Mode::CONSUME | Mode::NEW_ONLY | Mode::EXIST_ONLY | Mode::NO_RDMA
    }

    async fn destroy(&self) -> KvResult<()> {
        self.db.write().await.clear();
        Ok(())
    }

    async fn count(&self, _mode: Mode) -> KvResult<u64> {
        Ok(self.db.read().await.len() as u64)
    }

    async fn exists(
        &self,
        _mode: Mode,
        keys: &[u8],
        ksizes: &[u64],
        flags: &mut BitField<'_>,
    ) -> KvResult<()> {
        if ksizes.len() > flags.len() {
            return Err(KvError::InvalidArgs);
        }
        let db = self.db.read().await;
        let mut offset = 0;
        for (i, &ksize) in ksizes.iter().enumerate() {
            let key = batch::key_at(keys, offset, ksize)?;
            flags.set(i, db.contains(key));
            offset += ksize as usize;
        }
        Ok(())
    }

    async fn length(
        &self,
        _mode: Mode,
        keys: &[u8],
        ksizes: &[u64],
        vsizes: &mut [u64],
    ) -> KvResult<()> {
        if ksizes.len() != vsizes.len() {
            return Err(KvError::InvalidArgs);
        }
        let db = self.db.read().await;
        let mut offset = 0;
        for (i, &ksize) in ksizes.iter().enumerate() {
            let key = batch::key_at(keys, offset, ksize)?;
            vsizes[i] = if db.contains(key) { 0 } else { KEY_NOT_FOUND };
            offset += ksize as usize;
        }
        Ok(())
    }

    async fn put(
        &self,
        mode: Mode,
        keys: &[u8],
        ksizes: &[u64],
        vals: &[u8],
        vsizes: &[u64],
    ) -> KvResult<()> {
        if ksizes.len() != vsizes.len() {
            return Err(KvError::InvalidArgs);
        }
        if !vals.is_empty() || batch::checked_total(vsizes)? != 0 {
            return Err(KvError::InvalidArgs);
        }
        if batch::checked_total(ksizes)? > keys.len() as u64 {
            return Err(KvError::InvalidArgs);
        }
        let new_only = mode.contains(Mode::NEW_ONLY);
        let exist_only = mode.contains(Mode::EXIST_ONLY);
        let single = ksizes.len() == 1;

        let mut db = self.db.write().await;
        let mut offset = 0;
        for &ksize in ksizes {
            let key = batch::key_at(keys, offset, ksize)?;
            let present = db.contains(key);
            if present && new_only {
                return Err(KvError::KeyExists);
            }
            if !present && exist_only {
                if single {
                    return Err(KvError::KeyNotFound);
                }
                offset += ksize as usize;
                continue;
            }
            db.insert(key.to_vec());
            offset += ksize as usize;
        }
        Ok(())
    }

    async fn get(
        &self,
        mode: Mode,
        _packed: bool,
        keys: &[u8],
        ksizes: &[u64],
        vals: &mut OutBuf<'_>,
        vsizes: &mut [u64],
    ) -> KvResult<()> {
        if ksizes.len() != vsizes.len() {
            return Err(KvError::InvalidArgs);
        }
        let db = self.db.read().await;
        let mut offset = 0;
        for (i, &ksize) in ksizes.iter().enumerate() {
            let key = batch::key_at(keys, offset, ksize)?;
            vsizes[i] = if db.contains(key) { 0 } else { KEY_NOT_FOUND };
            offset += ksize as usize;
        }
        drop(db);
        vals.used = 0;

        if mode.contains(Mode::CONSUME) {
            let mut db = self.db.write().await;
            let mut offset = 0;
            for &ksize in ksizes {
                let key = batch::key_at(keys, offset, ksize)?;
                db.remove(key);
                offset += ksize as usize;
            }
        }
        Ok(())
    }

    async fn erase(&self, _mode: Mode, keys: &[u8], ksizes: &[u64]) -> KvResult<()> {
        let mut db = self.db.write().await;
        let mut offset = 0;
        for &ksize in ksizes {
            let key = batch::key_at(keys, offset, ksize)?;
            db.remove(key);
            offset += ksize as usize;
        }
        Ok(())
    }
}
