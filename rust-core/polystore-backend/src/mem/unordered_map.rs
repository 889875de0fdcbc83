// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Hashed in-memory map backend. No listings and no blocking waits;
// otherwise the same contract as the ordered map.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use polystore_core::{
    batch, BitField, KvError, KvResult, Mode, OutBuf, KEY_NOT_FOUND, SIZE_TOO_SMALL,
};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::backend::DatabaseBackend;
use crate::mem::{complete_allocators, complete_bucket_count, complete_use_lock, config_object};

/// Hashed map backend (`"unordered_map"`).
pub struct UnorderedMapBackend {
    config: Value,
    db: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl UnorderedMapBackend {
    /// Create a backend from its JSON config, filling in defaults.
    pub fn open(config: &Value) -> KvResult<Arc<dyn DatabaseBackend>> {
        let mut cfg = config_object(config)?;
        complete_use_lock(&mut cfg)?;
        let buckets = complete_bucket_count(&mut cfg)?;
        complete_allocators(&mut cfg)?;
        Ok(Arc::new(Self {
            config: Value::Object(cfg),
            db: RwLock::new(HashMap::with_capacity(buckets)),
        }))
    }
}

#[async_trait]
impl DatabaseBackend for UnorderedMapBackend {
    fn name(&self) -> &str {
        "unordered_map"
    }

    fn config(&self) -> Value {
        self.config.clone()
    }

    fn supported_modes(&self) -> Mode {
        // No listing bits (a hash table has no useful iteration order) and
        // no WAIT/NOTIFY (the watcher is not wired through this backend).
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
            flags.set(i, db.contains_key(key));
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
            vsizes[i] = match db.get(key) {
                Some(value) => value.len() as u64,
                None => KEY_NOT_FOUND,
            };
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
        if batch::checked_total(ksizes)? > keys.len() as u64
            || batch::checked_total(vsizes)? > vals.len() as u64
        {
            return Err(KvError::InvalidArgs);
        }
        let new_only = mode.contains(Mode::NEW_ONLY);
        let exist_only = mode.contains(Mode::EXIST_ONLY);
        let append = mode.contains(Mode::APPEND);
        let single = ksizes.len() == 1;

        let mut db = self.db.write().await;
        let mut key_offset = 0;
        let mut val_offset = 0;
        for i in 0..ksizes.len() {
            let key = batch::key_at(keys, key_offset, ksizes[i])?;
            let val = batch::key_at(vals, val_offset, vsizes[i])?;
            match db.get_mut(key) {
                Some(existing) => {
                    if new_only {
                        return Err(KvError::KeyExists);
                    }
                    if append {
                        existing.extend_from_slice(val);
                    } else {
                        *existing = val.to_vec();
                    }
                }
                None => {
                    if exist_only {
                        if single {
                            return Err(KvError::KeyNotFound);
                        }
                    } else {
                        db.insert(key.to_vec(), val.to_vec());
                    }
                }
            }
            key_offset += ksizes[i] as usize;
            val_offset += vsizes[i] as usize;
        }
        Ok(())
    }

    async fn get(
        &self,
        mode: Mode,
        packed: bool,
        keys: &[u8],
        ksizes: &[u64],
        vals: &mut OutBuf<'_>,
        vsizes: &mut [u64],
    ) -> KvResult<()> {
        if ksizes.len() != vsizes.len() {
            return Err(KvError::InvalidArgs);
        }
        let count = ksizes.len();
        let mut key_offset = 0;
        let mut val_offset = 0;
        let db = self.db.read().await;
        let mut i = 0;
        while i < count {
            let key = batch::key_at(keys, key_offset, ksizes[i])?;
            match db.get(key) {
                Some(value) => {
                    if packed {
                        if vals.data.len() - val_offset < value.len() {
                            // No further copies once the packed region is
                            // exhausted.
                            for slot in vsizes[i..].iter_mut() {
                                *slot = SIZE_TOO_SMALL;
                            }
                            break;
                        }
                        vals.data[val_offset..val_offset + value.len()].copy_from_slice(value);
                        vsizes[i] = value.len() as u64;
                        val_offset += value.len();
                    } else {
                        let cap = vsizes[i] as usize;
                        if val_offset.checked_add(cap).map_or(true, |e| e > vals.data.len()) {
                            return Err(KvError::InvalidArgs);
                        }
                        if cap < value.len() {
                            vsizes[i] = SIZE_TOO_SMALL;
                        } else {
                            vals.data[val_offset..val_offset + value.len()]
                                .copy_from_slice(value);
                            vsizes[i] = value.len() as u64;
                        }
                        val_offset += cap;
                    }
                }
                None => {
                    if !packed {
                        let cap = vsizes[i] as usize;
                        if val_offset.checked_add(cap).map_or(true, |e| e > vals.data.len()) {
                            return Err(KvError::InvalidArgs);
                        }
                        val_offset += cap;
                    }
                    vsizes[i] = KEY_NOT_FOUND;
                }
            }
            key_offset += ksizes[i] as usize;
            i += 1;
        }
        drop(db);
        vals.used = val_offset;

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

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_core::Filter;

    fn pack(items: &[&[u8]]) -> (Vec<u8>, Vec<u64>) {
        let blob = items.concat();
        let sizes = items.iter().map(|i| i.len() as u64).collect();
        (blob, sizes)
    }

    fn backend() -> Arc<dyn DatabaseBackend> {
        UnorderedMapBackend::open(&serde_json::json!({})).unwrap()
    }

    #[tokio::test]
    async fn test_round_trip() {
        let db = backend();
        let (kblob, ksizes) = pack(&[b"a".as_ref(), b"b"]);
        db.put(Mode::NONE, &kblob, &ksizes, b"12", &[1, 1])
            .await
            .unwrap();

        let mut vdata = vec![0u8; 8];
        let mut vals = OutBuf::new(&mut vdata);
        let mut vsizes = vec![0u64; 2];
        db.get(Mode::NONE, true, &kblob, &ksizes, &mut vals, &mut vsizes)
            .await
            .unwrap();
        assert_eq!(vsizes, vec![1, 1]);
        assert_eq!(&vals.data[..2], b"12");
    }

    #[tokio::test]
    async fn test_listing_is_unsupported() {
        let db = backend();
        let filter = Filter::new(Mode::NONE, b"").unwrap();
        let mut kdata = vec![0u8; 16];
        let mut keys_out = OutBuf::new(&mut kdata);
        let mut out_sizes = vec![0u64; 2];
        let err = db
            .list_keys(Mode::NONE, true, b"", &filter, &mut keys_out, &mut out_sizes)
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::OpUnsupported));
        // The listing bits are also outside the supported mask.
        assert!(!db.supports_mode(Mode::INCLUSIVE));
        assert!(db.supports_mode(Mode::CONSUME | Mode::NEW_ONLY));
    }

    #[tokio::test]
    async fn test_blocking_bits_are_unsupported() {
        let db = backend();
        assert!(!db.supports_mode(Mode::WAIT));
        assert!(!db.supports_mode(Mode::NOTIFY));
    }

    #[tokio::test]
    async fn test_bucket_count_config() {
        let db = UnorderedMapBackend::open(&serde_json::json!({
            "initial_bucket_count": 101
        }))
        .unwrap();
        assert_eq!(db.config()["initial_bucket_count"], serde_json::json!(101));
    }
}
