// SPDX-License-Identifier: PMPL-1.0-or-later
//
// redb-backed persistent backend.
//
// One redb database file with a single table. Read operations use read
// transactions (concurrent); writes are serialized by redb. Each write
// transaction is fsynced on commit, so a batch `put` is durable when the
// call returns. `destroy` drops the handle and unlinks the file.

use std::ops::Bound;
use std::path::PathBuf;
use std::sync::{Arc, RwLock as StdRwLock};

use async_trait::async_trait;
use polystore_core::{BitField, Filter, KvError, KvResult, Mode, OutBuf, KEY_NOT_FOUND};
use redb::{Database, ReadableDatabase, TableDefinition};
use serde_json::Value;
use tracing::debug;

use crate::backend::DatabaseBackend;
use crate::disk::{
    collect_keys, complete_disk_config, emit_fetched, emit_key_values, emit_keys, scan_step,
    ScanStep,
};
use crate::mem::config_object;

/// The single key/value table inside the database file.
const MAIN_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("polystore");

fn join_err(e: tokio::task::JoinError) -> KvError {
    KvError::Other(format!("task join: {e}"))
}

/// Persistent backend over redb (`"redb"`).
pub struct RedbBackend {
    config: Value,
    // `destroy` takes the handle out; later operations observe `None`.
    db: StdRwLock<Option<Arc<Database>>>,
    path: PathBuf,
    writable: bool,
}

impl RedbBackend {
    /// Open or create a redb database from its JSON config.
    pub fn open(config: &Value) -> KvResult<Arc<dyn DatabaseBackend>> {
        let mut cfg = config_object(config)?;
        let (path, writable) = complete_disk_config(&mut cfg)?;
        let path = PathBuf::from(path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(&path).map_err(|e| {
            KvError::Other(format!("failed to open redb at {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "opened redb backend");

        Ok(Arc::new(Self {
            config: Value::Object(cfg),
            db: StdRwLock::new(Some(Arc::new(db))),
            path,
            writable,
        }))
    }

    fn handle(&self) -> KvResult<Arc<Database>> {
        self.db
            .read()
            .expect("redb handle lock poisoned")
            .clone()
            .ok_or(KvError::Aborted)
    }

    fn check_writable(&self) -> KvResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(KvError::OpForbidden("database opened read-only".into()))
        }
    }
}

#[async_trait]
impl DatabaseBackend for RedbBackend {
    fn name(&self) -> &str {
        "redb"
    }

    fn config(&self) -> Value {
        self.config.clone()
    }

    fn supported_modes(&self) -> Mode {
        // The engine serializes its own writers; the watcher bits (WAIT,
        // NOTIFY) are not wired through disk backends.
        Mode::INCLUSIVE
            | Mode::APPEND
            | Mode::CONSUME
            | Mode::NEW_ONLY
            | Mode::NO_PREFIX
            | Mode::IGNORE_KEYS
            | Mode::KEEP_LAST
            | Mode::SUFFIX
            | Mode::LUA_FILTER
            | Mode::LIB_FILTER
            | Mode::NO_RDMA
    }

    async fn destroy(&self) -> KvResult<()> {
        let handle = self
            .db
            .write()
            .expect("redb handle lock poisoned")
            .take();
        drop(handle);
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn count(&self, _mode: Mode) -> KvResult<u64> {
        let db = self.handle()?;
        tokio::task::spawn_blocking(move || -> KvResult<u64> {
            let txn = db
                .begin_read()
                .map_err(|e| KvError::Other(format!("read txn: {e}")))?;
            let table = match txn.open_table(MAIN_TABLE) {
                Ok(t) => t,
                // No table yet means nothing was ever written.
                Err(_) => return Ok(0),
            };
            table
                .len()
                .map_err(|e| KvError::Corruption(format!("count: {e}")))
        })
        .await
        .map_err(join_err)?
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
        let db = self.handle()?;
        let owned = collect_keys(keys, ksizes)?;
        let bits = tokio::task::spawn_blocking(move || -> KvResult<Vec<bool>> {
            let txn = db
                .begin_read()
                .map_err(|e| KvError::Other(format!("read txn: {e}")))?;
            let table = match txn.open_table(MAIN_TABLE) {
                Ok(t) => t,
                Err(_) => return Ok(vec![false; owned.len()]),
            };
            let mut bits = Vec::with_capacity(owned.len());
            for key in &owned {
                let present = table
                    .get(key.as_slice())
                    .map_err(|e| KvError::Corruption(format!("get: {e}")))?
                    .is_some();
                bits.push(present);
            }
            Ok(bits)
        })
        .await
        .map_err(join_err)??;
        for (i, present) in bits.iter().enumerate() {
            flags.set(i, *present);
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
        let db = self.handle()?;
        let owned = collect_keys(keys, ksizes)?;
        let lengths = tokio::task::spawn_blocking(move || -> KvResult<Vec<Option<u64>>> {
            let txn = db
                .begin_read()
                .map_err(|e| KvError::Other(format!("read txn: {e}")))?;
            let table = match txn.open_table(MAIN_TABLE) {
                Ok(t) => t,
                Err(_) => return Ok(vec![None; owned.len()]),
            };
            let mut lengths = Vec::with_capacity(owned.len());
            for key in &owned {
                let len = table
                    .get(key.as_slice())
                    .map_err(|e| KvError::Corruption(format!("get: {e}")))?
                    .map(|v| v.value().len() as u64);
                lengths.push(len);
            }
            Ok(lengths)
        })
        .await
        .map_err(join_err)??;
        for (i, len) in lengths.iter().enumerate() {
            vsizes[i] = len.unwrap_or(KEY_NOT_FOUND);
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
        self.check_writable()?;
        let db = self.handle()?;
        let owned_keys = collect_keys(keys, ksizes)?;
        let owned_vals = collect_keys(vals, vsizes)?;
        let new_only = mode.contains(Mode::NEW_ONLY);
        let append = mode.contains(Mode::APPEND);

        tokio::task::spawn_blocking(move || -> KvResult<()> {
            let txn = db
                .begin_write()
                .map_err(|e| KvError::Other(format!("write txn: {e}")))?;
            let mut outcome = Ok(());
            {
                let mut table = txn
                    .open_table(MAIN_TABLE)
                    .map_err(|e| KvError::Other(format!("open table: {e}")))?;
                for (key, val) in owned_keys.iter().zip(&owned_vals) {
                    let existing = match table.get(key.as_slice()) {
                        Ok(guard) => guard.map(|g| g.value().to_vec()),
                        Err(e) => {
                            outcome = Err(KvError::Corruption(format!("get: {e}")));
                            break;
                        }
                    };
                    match existing {
                        Some(old) => {
                            if new_only {
                                outcome = Err(KvError::KeyExists);
                                break;
                            }
                            let stored = if append {
                                let mut merged = old;
                                merged.extend_from_slice(val);
                                merged
                            } else {
                                val.clone()
                            };
                            if let Err(e) =
                                table.insert(key.as_slice(), stored.as_slice())
                            {
                                outcome = Err(KvError::Corruption(format!("insert: {e}")));
                                break;
                            }
                        }
                        None => {
                            if let Err(e) = table.insert(key.as_slice(), val.as_slice()) {
                                outcome = Err(KvError::Corruption(format!("insert: {e}")));
                                break;
                            }
                        }
                    }
                }
            }
            // Keys processed before a per-key failure stay committed.
            txn.commit()
                .map_err(|e| KvError::Corruption(format!("commit: {e}")))?;
            outcome
        })
        .await
        .map_err(join_err)?
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
        let db = self.handle()?;
        let owned = collect_keys(keys, ksizes)?;
        let fetched = tokio::task::spawn_blocking(move || -> KvResult<Vec<Option<Vec<u8>>>> {
            let txn = db
                .begin_read()
                .map_err(|e| KvError::Other(format!("read txn: {e}")))?;
            let table = match txn.open_table(MAIN_TABLE) {
                Ok(t) => t,
                Err(_) => return Ok(vec![None; owned.len()]),
            };
            let mut fetched = Vec::with_capacity(owned.len());
            for key in &owned {
                let value = table
                    .get(key.as_slice())
                    .map_err(|e| KvError::Corruption(format!("get: {e}")))?
                    .map(|v| v.value().to_vec());
                fetched.push(value);
            }
            Ok(fetched)
        })
        .await
        .map_err(join_err)??;
        emit_fetched(packed, &fetched, vals, vsizes)?;

        if mode.contains(Mode::CONSUME) {
            return self.erase(mode, keys, ksizes).await;
        }
        Ok(())
    }

    async fn erase(&self, _mode: Mode, keys: &[u8], ksizes: &[u64]) -> KvResult<()> {
        self.check_writable()?;
        let db = self.handle()?;
        let owned = collect_keys(keys, ksizes)?;
        tokio::task::spawn_blocking(move || -> KvResult<()> {
            let txn = db
                .begin_write()
                .map_err(|e| KvError::Other(format!("write txn: {e}")))?;
            {
                let mut table = txn
                    .open_table(MAIN_TABLE)
                    .map_err(|e| KvError::Other(format!("open table: {e}")))?;
                for key in &owned {
                    table
                        .remove(key.as_slice())
                        .map_err(|e| KvError::Corruption(format!("remove: {e}")))?;
                }
            }
            txn.commit()
                .map_err(|e| KvError::Corruption(format!("commit: {e}")))?;
            Ok(())
        })
        .await
        .map_err(join_err)?
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
        let (matched, exhausted) = self
            .scan(mode, from_key.to_vec(), filter.clone(), ksizes.len())
            .await?;
        emit_keys(
            mode,
            packed,
            &matched,
            exhausted,
            filter.trim_len(),
            keys_out,
            ksizes,
        )
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
        let (matched, exhausted) = self
            .scan(mode, from_key.to_vec(), filter.clone(), ksizes.len())
            .await?;
        emit_key_values(
            mode,
            packed,
            &matched,
            exhausted,
            filter.trim_len(),
            keys_out,
            ksizes,
            vals_out,
            vsizes,
        )
    }
}

impl RedbBackend {
    /// Collect up to `max` filtered entries starting at `from_key`.
    async fn scan(
        &self,
        mode: Mode,
        from_key: Vec<u8>,
        filter: Filter,
        max: usize,
    ) -> KvResult<(Vec<(Vec<u8>, Vec<u8>)>, bool)> {
        let db = self.handle()?;
        let inclusive = mode.contains(Mode::INCLUSIVE);
        tokio::task::spawn_blocking(move || -> KvResult<(Vec<(Vec<u8>, Vec<u8>)>, bool)> {
            let txn = db
                .begin_read()
                .map_err(|e| KvError::Other(format!("read txn: {e}")))?;
            let table = match txn.open_table(MAIN_TABLE) {
                Ok(t) => t,
                Err(_) => return Ok((Vec::new(), true)),
            };
            let start: Bound<&[u8]> = if from_key.is_empty() {
                Bound::Unbounded
            } else if inclusive {
                Bound::Included(from_key.as_slice())
            } else {
                Bound::Excluded(from_key.as_slice())
            };
            let range = table
                .range::<&[u8]>((start, Bound::Unbounded))
                .map_err(|e| KvError::Corruption(format!("range: {e}")))?;

            let mut matched = Vec::new();
            let mut exhausted = true;
            for entry in range {
                let (kg, vg) =
                    entry.map_err(|e| KvError::Corruption(format!("scan: {e}")))?;
                let key = kg.value().to_vec();
                let value = vg.value().to_vec();
                match scan_step(&filter, &key, &value) {
                    ScanStep::Stop => break,
                    ScanStep::Skip => continue,
                    ScanStep::Keep => {}
                }
                matched.push((key, value));
                if matched.len() == max {
                    exhausted = false;
                    break;
                }
            }
            Ok((matched, exhausted))
        })
        .await
        .map_err(join_err)?
    }
}
