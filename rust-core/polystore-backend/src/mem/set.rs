// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Ordered in-memory set backend.
//
// Keys only: every value argument must be empty, `length` and `get` report
// zero-length values for present keys. The listing machinery is shared in
// spirit with the map backend but iterates a `BTreeSet`.

use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use polystore_core::registry::CompareFn;
use polystore_core::{
    batch, key_copy, BitField, Filter, KvError, KvResult, KeyWatcher, Mode, OutBuf, WaitOutcome,
    KEY_NOT_FOUND, NO_MORE_KEYS, SIZE_TOO_SMALL,
};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::backend::{DatabaseBackend, WAIT_TIMEOUT};
use crate::mem::{
    complete_allocators, complete_comparator, complete_use_lock, config_object, OrderedKey,
};

/// Ordered set backend (`"set"`).
pub struct SetBackend {
    config: Value,
    cmp: CompareFn,
    db: RwLock<BTreeSet<OrderedKey>>,
    watcher: KeyWatcher,
}

impl SetBackend {
    /// Create a backend from its JSON config, filling in defaults.
    pub fn open(config: &Value) -> KvResult<Arc<dyn DatabaseBackend>> {
        let mut cfg = config_object(config)?;
        complete_use_lock(&mut cfg)?;
        let cmp = complete_comparator(&mut cfg)?;
        complete_allocators(&mut cfg)?;
        Ok(Arc::new(Self {
            config: Value::Object(cfg),
            cmp,
            db: RwLock::new(BTreeSet::new()),
            watcher: KeyWatcher::new(),
        }))
    }

    fn probe(&self, key: &[u8]) -> OrderedKey {
        OrderedKey::new(key.to_vec(), self.cmp)
    }
}

#[async_trait]
impl DatabaseBackend for SetBackend {
    fn name(&self) -> &str {
        "set"
    }

    fn config(&self) -> Value {
        self.config.clone()
    }

    fn supported_modes(&self) -> Mode {
        // APPEND, NEW_ONLY and EXIST_ONLY are accepted although a backend
        // that stores no values has little use for APPEND.
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
                if db.contains(&self.probe(key)) {
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
                if db.contains(&self.probe(key)) {
                    vsizes[i] = 0;
                    break;
                }
                if !wait {
                    vsizes[i] = KEY_NOT_FOUND;
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
        // A set stores no values.
        if !vals.is_empty() || batch::checked_total(vsizes)? != 0 {
            return Err(KvError::InvalidArgs);
        }
        if batch::checked_total(ksizes)? > keys.len() as u64 {
            return Err(KvError::InvalidArgs);
        }
        let new_only = mode.contains(Mode::NEW_ONLY);
        let exist_only = mode.contains(Mode::EXIST_ONLY);
        let notify = mode.contains(Mode::NOTIFY);
        let single = ksizes.len() == 1;

        let mut db = self.db.write().await;
        let mut offset = 0;
        for &ksize in ksizes {
            let key = batch::key_at(keys, offset, ksize)?;
            let present = db.contains(&self.probe(key));
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
            db.insert(self.probe(key));
            if notify {
                // Notify with the key just inserted.
                self.watcher.notify_key(key);
            }
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
        let wait = mode.contains(Mode::WAIT);
        let mut offset = 0;
        for (i, &ksize) in ksizes.iter().enumerate() {
            let key = batch::key_at(keys, offset, ksize)?;
            loop {
                let db = self.db.read().await;
                if db.contains(&self.probe(key)) {
                    vsizes[i] = 0;
                    break;
                }
                if !wait {
                    vsizes[i] = KEY_NOT_FOUND;
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
        vals.used = 0;

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
                if db.remove(&self.probe(key)) || !wait {
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
            let Some(k) = it.next() else { break };
            if !filter.check(k.bytes(), b"") {
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
                        // Advance by the emitted size, not the slot width.
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
        // Values are all empty; emit keys and zero value sizes.
        self.list_keys(mode, packed, from_key, filter, keys_out, ksizes)
            .await?;
        for (i, slot) in vsizes.iter_mut().enumerate() {
            *slot = if ksizes[i] == NO_MORE_KEYS { NO_MORE_KEYS } else { 0 };
        }
        vals_out.used = 0;
        Ok(())
    }
}
