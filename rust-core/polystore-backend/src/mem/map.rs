// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Ordered in-memory map backend.
//
// Storage is a `BTreeMap` over comparator-carrying keys behind a
// `tokio::sync::RwLock`. Reads take shared access; `put`, `erase`, and
// `destroy` take exclusive access. Under `WAIT`, a reader registers with the
// watcher while still holding the read lock, releases it, suspends, and
// retries the lookup from scratch after waking.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use polystore_core::registry::CompareFn;
use polystore_core::{
    batch, key_copy, val_copy, BitField, Filter, KvError, KvResult, KeyWatcher, Mode, OutBuf,
    WaitOutcome, KEY_NOT_FOUND, NO_MORE_KEYS, SIZE_TOO_SMALL,
};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::backend::{DatabaseBackend, WAIT_TIMEOUT};
use crate::mem::{
    complete_allocators, complete_comparator, complete_use_lock, config_object, OrderedKey,
};

/// Ordered map backend (`"map"`).
pub struct MapBackend {
    config: Value,
    cmp: CompareFn,
    db: RwLock<BTreeMap<OrderedKey, Vec<u8>>>,
    watcher: KeyWatcher,
}

impl MapBackend {
    /// Create a backend from its JSON config, filling in defaults.
    pub fn open(config: &Value) -> KvResult<Arc<dyn DatabaseBackend>> {
        let mut cfg = config_object(config)?;
        complete_use_lock(&mut cfg)?;
        let cmp = complete_comparator(&mut cfg)?;
        complete_allocators(&mut cfg)?;
        Ok(Arc::new(Self {
            config: Value::Object(cfg),
            cmp,
            db: RwLock::new(BTreeMap::new()),
            watcher: KeyWatcher::new(),
        }))
    }

    fn probe(&self, key: &[u8]) -> OrderedKey {
        OrderedKey::new(key.to_vec(), self.cmp)
    }
}

#[async_trait]
impl DatabaseBackend for MapBackend {
    fn name(&self) -> &str {
        "map"
    }

    fn config(&self) -> Value {
        self.config.clone()
    }

    fn supported_modes(&self) -> Mode {
        Mode::INCLUSIVE
            | Mode::APPEND
            | Mode::CONSUME
            | Mode::WAIT
            | Mode::NOTIFY
            | Mode::NEW_ONLY
            | Mode::EXIST_ONLY
            | Mode::NO_PREFIX
            | Mode::IGNORE_KEYS
            | Mode::KEEP_LAST
            | Mode::SUFFIX
            | Mode::LUA_FILTER
            | Mode::LIB_FILTER
            | Mode::NO_RDMA
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
        mode: Mode,
        keys: &[u8],
        ksizes: &[u64],
        flags: &mut BitField<'_>,
    ) -> KvResult<()> {
        if ksizes.len() > flags.len() {
            return Err(KvError::InvalidArgs);
        }
        let wait = mode.contains(Mode::WAIT);
        let mut offset = 0;
        for (i, &ksize) in ksizes.iter().enumerate() {
            let key = batch::key_at(keys, offset, ksize)?;
            loop {
                let db = self.db.read().await;
                if db.contains_key(&self.probe(key)) {
                    flags.set(i, true);
                    break;
                }
                if !wait {
                    flags.set(i, false);
                    break;
                }
                let ticket = self.watcher.add_key(key);
                drop(db);
                match self.watcher.wait_key(key, ticket, WAIT_TIMEOUT).await {
                    WaitOutcome::Present => continue,
                    WaitOutcome::TimedOut => return Err(KvError::Timeout),
                }
            }
            offset += ksize as usize;
        }
        Ok(())
    }

    async fn length(
        &self,
        mode: Mode,
        keys: &[u8],
        ksizes: &[u64],
        vsizes: &mut [u64],
    ) -> KvResult<()> {
        if ksizes.len() != vsizes.len() {
            return Err(KvError::InvalidArgs);
        }
        let wait = mode.contains(Mode::WAIT);
        let mut offset = 0;
        for (i, &ksize) in ksizes.iter().enumerate() {
            let key = batch::key_at(keys, offset, ksize)?;
            loop {
                let db = self.db.read().await;
                match db.get(&self.probe(key)) {
                    Some(value) => {
                        vsizes[i] = value.len() as u64;
                        break;
                    }
                    None if !wait => {
                        vsizes[i] = KEY_NOT_FOUND;
                        break;
                    }
                    None => {
                        let ticket = self.watcher.add_key(key);
                        drop(db);
                        match self.watcher.wait_key(key, ticket, WAIT_TIMEOUT).await {
                            WaitOutcome::Present => continue,
                            WaitOutcome::TimedOut => return Err(KvError::Timeout),
                        }
                    }
                }
            }
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
        let notify = mode.contains(Mode::NOTIFY);
        let single = ksizes.len() == 1;

        let mut db = self.db.write().await;
        let mut key_offset = 0;
        let mut val_offset = 0;
        for i in 0..ksizes.len() {
            let key = batch::key_at(keys, key_offset, ksizes[i])?;
            let val = batch::key_at(vals, val_offset, vsizes[i])?;
            let mut stored = true;
            match db.get_mut(&self.probe(key)) {
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
                        stored = false;
                    } else {
                        db.insert(self.probe(key), val.to_vec());
                    }
                }
            }
            if notify && stored {
                self.watcher.notify_key(key);
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
        let wait = mode.contains(Mode::WAIT);
        let count = ksizes.len();
        let mut key_offset = 0;
        let mut val_offset = 0;
        let mut i = 0;
        while i < count {
            let key = batch::key_at(keys, key_offset, ksizes[i])?;
            let mut packed_overflow = false;
            loop {
                let db = self.db.read().await;
                match db.get(&self.probe(key)) {
                    Some(value) => {
                        if packed {
                            if vals.data.len() - val_offset < value.len() {
                                packed_overflow = true;
                            } else {
                                vals.data[val_offset..val_offset + value.len()]
                                    .copy_from_slice(value);
                                vsizes[i] = value.len() as u64;
                                val_offset += value.len();
                            }
                        } else {
                            let cap = vsizes[i] as usize;
                            if val_offset.checked_add(cap).map_or(true, |e| e > vals.data.len())
                            {
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
                        break;
                    }
                    None if !wait => {
                        if !packed {
                            let cap = vsizes[i] as usize;
                            if val_offset.checked_add(cap).map_or(true, |e| e > vals.data.len())
                            {
                                return Err(KvError::InvalidArgs);
                            }
                            val_offset += cap;
                        }
                        vsizes[i] = KEY_NOT_FOUND;
                        break;
                    }
                    None => {
                        let ticket = self.watcher.add_key(key);
                        drop(db);
                        match self.watcher.wait_key(key, ticket, WAIT_TIMEOUT).await {
                            WaitOutcome::Present => continue,
                            WaitOutcome::TimedOut => return Err(KvError::Timeout),
                        }
                    }
                }
            }
            if packed_overflow {
                // No further copies once the packed region is exhausted.
                for slot in vsizes[i..].iter_mut() {
                    *slot = SIZE_TOO_SMALL;
                }
                break;
            }
            key_offset += ksizes[i] as usize;
            i += 1;
        }
        vals.used = val_offset;

        if mode.contains(Mode::CONSUME) {
            let mut db = self.db.write().await;
            let mut offset = 0;
            for &ksize in ksizes {
                let key = batch::key_at(keys, offset, ksize)?;
                db.remove(&self.probe(key));
                offset += ksize as usize;
            }
        }
        Ok(())
    }

    async fn erase(&self, mode: Mode, keys: &[u8], ksizes: &[u64]) -> KvResult<()> {
        let wait = mode.contains(Mode::WAIT);
        let mut offset = 0;
        for &ksize in ksizes {
            let key = batch::key_at(keys, offset, ksize)?;
            loop {
                let mut db = self.db.write().await;
                if db.remove(&self.probe(key)).is_some() || !wait {
                    break;
                }
                let ticket = self.watcher.add_key(key);
                drop(db);
                match self.watcher.wait_key(key, ticket, WAIT_TIMEOUT).await {
                    WaitOutcome::Present => continue,
                    WaitOutcome::TimedOut => return Err(KvError::Timeout),
                }
            }
            offset += ksize as usize;
        }
        Ok(())
    }

    async fn list_keys(
        &self,
        mode: Mode,
        packed: bool,
        from_key: &[u8],
        filter: &Filter,
        keys_out: &mut OutBuf<'_>,
        ksizes: &mut [u64],
    ) -> KvResult<()> {
        let db = self.db.read().await;
        let start = if from_key.is_empty() {
            Bound::Unbounded
        } else if mode.contains(Mode::INCLUSIVE) {
            Bound::Included(self.probe(from_key))
        } else {
            Bound::Excluded(self.probe(from_key))
        };
        let mut it = db.range((start, Bound::Unbounded)).peekable();

        let max = ksizes.len();
        let mut i = 0;
        let mut key_offset = 0;
        let mut overflow = false;
        while i < max {
            let Some((k, v)) = it.next() else { break };
            if !filter.check(k.bytes(), v) {
                if filter.should_stop(k.bytes()) {
                    break;
                }
                continue;
            }
            let is_last = i + 1 == max || it.peek().is_none();
            if packed {
                if overflow {
                    ksizes[i] = SIZE_TOO_SMALL;
                } else {
                    let emitted = key_copy(
                        mode,
                        &mut keys_out.data[key_offset..],
                        k.bytes(),
                        filter.trim_len(),
                        is_last,
                    );
                    ksizes[i] = emitted;
                    if emitted == SIZE_TOO_SMALL {
                        overflow = true;
                    } else {
                        key_offset += emitted as usize;
                    }
                }
            } else {
                let cap = ksizes[i] as usize;
                if key_offset.checked_add(cap).map_or(true, |e| e > keys_out.data.len()) {
                    return Err(KvError::InvalidArgs);
                }
                ksizes[i] = key_copy(
                    mode,
                    &mut keys_out.data[key_offset..key_offset + cap],
                    k.bytes(),
                    filter.trim_len(),
                    is_last,
                );
                key_offset += cap;
            }
            i += 1;
        }
        keys_out.used = key_offset;
        for slot in ksizes[i..].iter_mut() {
            *slot = NO_MORE_KEYS;
        }
        Ok(())
    }

    async fn list_key_values(
        &self,
        mode: Mode,
        packed: bool,
        from_key: &[u8],
        filter: &Filter,
        keys_out: &mut OutBuf<'_>,
        ksizes: &mut [u64],
        vals_out: &mut OutBuf<'_>,
        vsizes: &mut [u64],
    ) -> KvResult<()> {
        if ksizes.len() != vsizes.len() {
            return Err(KvError::InvalidArgs);
        }
        let db = self.db.read().await;
        let start = if from_key.is_empty() {
            Bound::Unbounded
        } else if mode.contains(Mode::INCLUSIVE) {
            Bound::Included(self.probe(from_key))
        } else {
            Bound::Excluded(self.probe(from_key))
        };
        let mut it = db.range((start, Bound::Unbounded)).peekable();

        let max = ksizes.len();
        let mut i = 0;
        let mut key_offset = 0;
        let mut val_offset = 0;
        let mut key_overflow = false;
        let mut val_overflow = false;
        while i < max {
            let Some((k, v)) = it.next() else { break };
            if !filter.check(k.bytes(), v) {
                if filter.should_stop(k.bytes()) {
                    break;
                }
                continue;
            }
            let is_last = i + 1 == max || it.peek().is_none();
            // Key and value buffers track overflow independently.
            if packed {
                if key_overflow {
                    ksizes[i] = SIZE_TOO_SMALL;
                } else {
                    let emitted = key_copy(
                        mode,
                        &mut keys_out.data[key_offset..],
                        k.bytes(),
                        filter.trim_len(),
                        is_last,
                    );
                    ksizes[i] = emitted;
                    if emitted == SIZE_TOO_SMALL {
                        key_overflow = true;
                    } else {
                        key_offset += emitted as usize;
                    }
                }
                if val_overflow {
                    vsizes[i] = SIZE_TOO_SMALL;
                } else {
                    let emitted = val_copy(&mut vals_out.data[val_offset..], v);
                    vsizes[i] = emitted;
                    if emitted == SIZE_TOO_SMALL {
                        val_overflow = true;
                    } else {
                        val_offset += emitted as usize;
                    }
                }
            } else {
                let kcap = ksizes[i] as usize;
                let vcap = vsizes[i] as usize;
                if key_offset.checked_add(kcap).map_or(true, |e| e > keys_out.data.len())
                    || val_offset.checked_add(vcap).map_or(true, |e| e > vals_out.data.len())
                {
                    return Err(KvError::InvalidArgs);
                }
                ksizes[i] = key_copy(
                    mode,
                    &mut keys_out.data[key_offset..key_offset + kcap],
                    k.bytes(),
                    filter.trim_len(),
                    is_last,
                );
                vsizes[i] = val_copy(&mut vals_out.data[val_offset..val_offset + vcap], v);
                key_offset += kcap;
                val_offset += vcap;
            }
            i += 1;
        }
        keys_out.used = key_offset;
        vals_out.used = val_offset;
        for slot in ksizes[i..].iter_mut() {
            *slot = NO_MORE_KEYS;
        }
        for slot in vsizes[i..].iter_mut() {
            *slot = NO_MORE_KEYS;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(items: &[&[u8]]) -> (Vec<u8>, Vec<u64>) {
        let blob = items.concat();
        let sizes = items.iter().map(|i| i.len() as u64).collect();
        (blob, sizes)
    }

    fn backend() -> Arc<dyn DatabaseBackend> {
        MapBackend::open(&serde_json::json!({})).unwrap()
    }

    async fn put_pairs(db: &Arc<dyn DatabaseBackend>, pairs: &[(&[u8], &[u8])]) {
        let keys: Vec<&[u8]> = pairs.iter().map(|(k, _)| *k).collect();
        let vals: Vec<&[u8]> = pairs.iter().map(|(_, v)| *v).collect();
        let (kblob, ksizes) = pack(&keys);
        let (vblob, vsizes) = pack(&vals);
        db.put(Mode::NONE, &kblob, &ksizes, &vblob, &vsizes)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_get_unpacked_with_missing_key() {
        let db = backend();
        put_pairs(&db, &[(b"apple", b"red"), (b"banana", b"yellow")]).await;

        let (kblob, ksizes) = pack(&[b"banana".as_ref(), b"apple", b"cherry"]);
        let mut vdata = vec![0u8; 96];
        let mut vals = OutBuf::new(&mut vdata);
        let mut vsizes = vec![32u64, 32, 32];
        db.get(Mode::NONE, false, &kblob, &ksizes, &mut vals, &mut vsizes)
            .await
            .unwrap();

        assert_eq!(vsizes, vec![6, 3, KEY_NOT_FOUND]);
        assert_eq!(&vals.data[..6], b"yellow");
        assert_eq!(&vals.data[32..35], b"red");
        assert_eq!(vals.used, 96);
    }

    #[tokio::test]
    async fn test_get_packed() {
        let db = backend();
        put_pairs(&db, &[(b"a", b"one"), (b"b", b"two")]).await;

        let (kblob, ksizes) = pack(&[b"a".as_ref(), b"missing", b"b"]);
        let mut vdata = vec![0u8; 64];
        let mut vals = OutBuf::new(&mut vdata);
        let mut vsizes = vec![0u64; 3];
        db.get(Mode::NONE, true, &kblob, &ksizes, &mut vals, &mut vsizes)
            .await
            .unwrap();

        assert_eq!(vsizes, vec![3, KEY_NOT_FOUND, 3]);
        assert_eq!(vals.used, 6);
        assert_eq!(&vals.data[..6], b"onetwo");
    }

    #[tokio::test]
    async fn test_get_packed_overflow_poisons_remaining_slots() {
        let db = backend();
        put_pairs(&db, &[(b"a", b"0123456789"), (b"b", b"x"), (b"c", b"y")]).await;

        let (kblob, ksizes) = pack(&[b"a".as_ref(), b"b", b"c"]);
        let mut vdata = vec![0u8; 4];
        let mut vals = OutBuf::new(&mut vdata);
        let mut vsizes = vec![0u64; 3];
        db.get(Mode::NONE, true, &kblob, &ksizes, &mut vals, &mut vsizes)
            .await
            .unwrap();

        assert_eq!(vsizes, vec![SIZE_TOO_SMALL; 3]);
        assert_eq!(vals.used, 0);
    }

    #[tokio::test]
    async fn test_get_unpacked_slot_too_small() {
        let db = backend();
        put_pairs(&db, &[(b"k", b"0123456789")]).await;

        let (kblob, ksizes) = pack(&[b"k".as_ref()]);
        let mut vdata = vec![0u8; 4];
        let mut vals = OutBuf::new(&mut vdata);
        let mut vsizes = vec![4u64];
        db.get(Mode::NONE, false, &kblob, &ksizes, &mut vals, &mut vsizes)
            .await
            .unwrap();
        assert_eq!(vsizes[0], SIZE_TOO_SMALL);
        // Nothing observable beyond the slot capacity.
        assert_eq!(vals.data, [0u8; 4]);
    }

    #[tokio::test]
    async fn test_new_only_collision_keeps_first_value() {
        let db = backend();
        let (kblob, ksizes) = pack(&[b"k".as_ref()]);

        db.put(Mode::NEW_ONLY, &kblob, &ksizes, b"v1", &[2])
            .await
            .unwrap();
        let err = db
            .put(Mode::NEW_ONLY, &kblob, &ksizes, b"v2", &[2])
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::KeyExists));

        let mut vdata = vec![0u8; 8];
        let mut vals = OutBuf::new(&mut vdata);
        let mut vsizes = vec![8u64];
        db.get(Mode::NONE, false, &kblob, &ksizes, &mut vals, &mut vsizes)
            .await
            .unwrap();
        assert_eq!(vsizes[0], 2);
        assert_eq!(&vals.data[..2], b"v1");
    }

    #[tokio::test]
    async fn test_exist_only() {
        let db = backend();
        let (kblob, ksizes) = pack(&[b"k".as_ref()]);

        let err = db
            .put(Mode::EXIST_ONLY, &kblob, &ksizes, b"v", &[1])
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::KeyNotFound));

        put_pairs(&db, &[(b"k", b"old")]).await;
        db.put(Mode::EXIST_ONLY, &kblob, &ksizes, b"new", &[3])
            .await
            .unwrap();

        let mut vsizes = vec![8u64];
        let mut vdata = vec![0u8; 8];
        let mut vals = OutBuf::new(&mut vdata);
        db.get(Mode::NONE, false, &kblob, &ksizes, &mut vals, &mut vsizes)
            .await
            .unwrap();
        assert_eq!(&vals.data[..3], b"new");
    }

    #[tokio::test]
    async fn test_append() {
        let db = backend();
        put_pairs(&db, &[(b"log", b"one,")]).await;
        let (kblob, ksizes) = pack(&[b"log".as_ref()]);
        db.put(Mode::APPEND, &kblob, &ksizes, b"two", &[3])
            .await
            .unwrap();

        let mut vsizes = vec![16u64];
        let mut vdata = vec![0u8; 16];
        let mut vals = OutBuf::new(&mut vdata);
        db.get(Mode::NONE, false, &kblob, &ksizes, &mut vals, &mut vsizes)
            .await
            .unwrap();
        assert_eq!(vsizes[0], 7);
        assert_eq!(&vals.data[..7], b"one,two");
    }

    #[tokio::test]
    async fn test_consume_erases_after_read() {
        let db = backend();
        put_pairs(&db, &[(b"k", b"v")]).await;
        let (kblob, ksizes) = pack(&[b"k".as_ref()]);

        let mut vsizes = vec![8u64];
        let mut vdata = vec![0u8; 8];
        let mut vals = OutBuf::new(&mut vdata);
        db.get(Mode::CONSUME, false, &kblob, &ksizes, &mut vals, &mut vsizes)
            .await
            .unwrap();
        assert_eq!(vsizes[0], 1);
        assert_eq!(db.count(Mode::NONE).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_erase_missing_is_not_an_error() {
        let db = backend();
        put_pairs(&db, &[(b"a", b"1")]).await;
        let (kblob, ksizes) = pack(&[b"a".as_ref(), b"ghost"]);
        db.erase(Mode::NONE, &kblob, &ksizes).await.unwrap();
        assert_eq!(db.count(Mode::NONE).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_exists_bits() {
        let db = backend();
        put_pairs(&db, &[(b"y", b"1")]).await;
        let (kblob, ksizes) = pack(&[b"x".as_ref(), b"y", b"z"]);
        let mut storage = [0u8; 1];
        let mut flags = BitField::new(&mut storage, 3).unwrap();
        flags.clear();
        db.exists(Mode::NONE, &kblob, &ksizes, &mut flags)
            .await
            .unwrap();
        assert!(!flags.get(0));
        assert!(flags.get(1));
        assert!(!flags.get(2));
    }

    #[tokio::test]
    async fn test_length_reports_sizes_and_missing() {
        let db = backend();
        put_pairs(&db, &[(b"a", b"abc")]).await;
        let (kblob, ksizes) = pack(&[b"a".as_ref(), b"nope"]);
        let mut vsizes = vec![0u64; 2];
        db.length(Mode::NONE, &kblob, &ksizes, &mut vsizes)
            .await
            .unwrap();
        assert_eq!(vsizes, vec![3, KEY_NOT_FOUND]);
    }

    #[tokio::test]
    async fn test_wait_then_notify() {
        let db = backend();
        let reader = {
            let db = Arc::clone(&db);
            tokio::spawn(async move {
                let (kblob, ksizes) = pack(&[b"k".as_ref()]);
                let mut vdata = vec![0u8; 8];
                let mut vals = OutBuf::new(&mut vdata);
                let mut vsizes = vec![8u64];
                db.get(Mode::WAIT, false, &kblob, &ksizes, &mut vals, &mut vsizes)
                    .await
                    .unwrap();
                assert_eq!(vsizes[0], 1);
                vals.data[..1].to_vec()
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let (kblob, ksizes) = pack(&[b"k".as_ref()]);
        db.put(Mode::NOTIFY, &kblob, &ksizes, b"v", &[1])
            .await
            .unwrap();

        assert_eq!(reader.await.unwrap(), b"v");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_writer() {
        let db = backend();
        let (kblob, ksizes) = pack(&[b"never".as_ref()]);
        let mut storage = [0u8; 1];
        let mut flags = BitField::new(&mut storage, 1).unwrap();
        let err = db
            .exists(Mode::WAIT, &kblob, &ksizes, &mut flags)
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::Timeout));
    }

    #[tokio::test]
    async fn test_batch_put_mismatched_sizes() {
        let db = backend();
        let err = db
            .put(Mode::NONE, b"ab", &[1, 1], b"", &[0])
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::InvalidArgs));
    }

    #[tokio::test]
    async fn test_config_snapshot_has_defaults() {
        let db = backend();
        let cfg = db.config();
        assert_eq!(cfg["use_lock"], serde_json::json!(true));
        assert_eq!(cfg["comparator"], serde_json::json!("default"));
        assert_eq!(
            cfg["allocators"]["key_allocator"],
            serde_json::json!("default")
        );
    }
}
