// SPDX-License-Identifier: PMPL-1.0-or-later
//
// sled-backed persistent backend.
//
// One sled tree per database, stored in a directory. sled handles its own
// locking and crash recovery; writes are flushed at the end of each batch
// so an acknowledged `put` survives a restart. `destroy` drops the handle
// and removes the directory.

use std::ops::Bound;
use std::path::PathBuf;
use std::sync::RwLock as StdRwLock;
use std::sync::Arc;

use async_trait::async_trait;
use polystore_core::{BitField, Filter, KvError, KvResult, Mode, OutBuf, KEY_NOT_FOUND};
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::DatabaseBackend;
use crate::disk::{
    collect_keys, complete_disk_config, emit_fetched, emit_key_values, emit_keys, scan_step,
    ScanStep,
};
use crate::mem::config_object;

fn join_err(e: tokio::task::JoinError) -> KvError {
    KvError::Other(format!("task join: {e}"))
}

/// Translate a sled error into the backend taxonomy.
fn convert_sled(e: sled::Error) -> KvError {
    match e {
        sled::Error::Io(io) => KvError::Io(io),
        sled::Error::Unsupported(_) => KvError::OpUnsupported,
        err @ sled::Error::Corruption { .. } => KvError::Corruption(err.to_string()),
        err => KvError::Other(err.to_string()),
    }
}

/// Persistent backend over sled (`"sled"`).
pub struct SledBackend {
    config: Value,
    db: StdRwLock<Option<sled::Db>>,
    path: PathBuf,
    writable: bool,
}

impl SledBackend {
    /// Open or create a sled tree from its JSON config.
    pub fn open(config: &Value) -> KvResult<Arc<dyn DatabaseBackend>> {
        let mut cfg = config_object(config)?;
        let (path, writable) = complete_disk_config(&mut cfg)?;
        let path = PathBuf::from(path);

        let cache_capacity = match cfg.get("cache_capacity") {
            None => {
                cfg.insert("cache_capacity".into(), json!(null));
                None
            }
            Some(Value::Null) => None,
            Some(v) => Some(v.as_u64().ok_or_else(|| {
                KvError::InvalidConfig("cache_capacity must be an unsigned integer".into())
            })?),
        };

        let mut builder = sled::Config::new().path(&path);
        if let Some(capacity) = cache_capacity {
            builder = builder.cache_capacity(capacity);
        }
        let db = builder.open().map_err(convert_sled)?;
        debug!(path = %path.display(), "opened sled backend");

        Ok(Arc::new(Self {
            config: Value::Object(cfg),
            db: StdRwLock::new(Some(db)),
            path,
            writable,
        }))
    }

    fn handle(&self) -> KvResult<sled::Db> {
        self.db
            .read()
            .expect("sled handle lock poisoned")
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
impl DatabaseBackend for SledBackend {
    fn name(&self) -> &str {
        "sled"
    }

    fn config(&self) -> Value {
        self.config.clone()
    }

    fn supported_modes(&self) -> Mode {
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
            .expect("sled handle lock poisoned")
            .take();
        drop(handle);
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn count(&self, _mode: Mode) -> KvResult<u64> {
        let db = self.handle()?;
        tokio::task::spawn_blocking(move || Ok(db.len() as u64))
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
            owned
                .iter()
                .map(|k| db.contains_key(k).map_err(convert_sled))
                .collect()
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
            owned
                .iter()
                .map(|k| {
                    db.get(k)
                        .map(|v| v.map(|ivec| ivec.len() as u64))
                        .map_err(convert_sled)
                })
                .collect()
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
            let mut outcome = Ok(());
            for (key, val) in owned_keys.iter().zip(&owned_vals) {
                let existing = match db.get(key) {
                    Ok(v) => v,
                    Err(e) => {
                        outcome = Err(convert_sled(e));
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
                            let mut merged = old.to_vec();
                            merged.extend_from_slice(val);
                            merged
                        } else {
                            val.clone()
                        };
                        if let Err(e) = db.insert(key, stored) {
                            outcome = Err(convert_sled(e));
                            break;
                        }
                    }
                    None => {
                        if let Err(e) = db.insert(key, val.clone()) {
                            outcome = Err(convert_sled(e));
                            break;
                        }
                    }
                }
            }
            db.flush().map_err(convert_sled)?;
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
            owned
                .iter()
                .map(|k| {
                    db.get(k)
                        .map(|v| v.map(|ivec| ivec.to_vec()))
                        .map_err(convert_sled)
                })
                .collect()
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
            for key in &owned {
                db.remove(key).map_err(convert_sled)?;
            }
            db.flush().map_err(convert_sled)?;
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

impl SledBackend {
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
            let start: Bound<&[u8]> = if from_key.is_empty() {
                Bound::Unbounded
            } else if inclusive {
                Bound::Included(from_key.as_slice())
            } else {
                Bound::Excluded(from_key.as_slice())
            };
            let mut matched = Vec::new();
            let mut exhausted = true;
            for entry in db.range::<&[u8], _>((start, Bound::Unbounded)) {
                let (key, value) = entry.map_err(convert_sled)?;
                match scan_step(&filter, &key, &value) {
                    ScanStep::Stop => break,
                    ScanStep::Skip => continue,
                    ScanStep::Keep => {}
                }
                matched.push((key.to_vec(), value.to_vec()));
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
