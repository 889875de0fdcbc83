// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Disk-backed backends.
//
// Adapters over embedded engines honoring the same contract as the
// in-memory backends. Engine calls are blocking, so every operation runs
// under `spawn_blocking` with owned copies of its arguments; result
// emission back into the caller's buffers happens on the async side with
// the same packed/unpacked disciplines as the in-memory backends.

#[cfg(feature = "redb-backend")]
pub mod redb;
#[cfg(feature = "sled-backend")]
pub mod sled;

use polystore_core::{
    batch, key_copy, val_copy, Filter, KvError, KvResult, Mode, OutBuf, KEY_NOT_FOUND,
    NO_MORE_KEYS, SIZE_TOO_SMALL,
};
use serde_json::{json, Map, Value};

/// Walk a packed key blob into owned per-key vectors.
pub(crate) fn collect_keys(keys: &[u8], ksizes: &[u64]) -> KvResult<Vec<Vec<u8>>> {
    let mut out = Vec::with_capacity(ksizes.len());
    let mut offset = 0;
    for &ksize in ksizes {
        out.push(batch::key_at(keys, offset, ksize)?.to_vec());
        offset += ksize as usize;
    }
    Ok(out)
}

/// Emit fetched values into the caller's buffers.
pub(crate) fn emit_fetched(
    packed: bool,
    fetched: &[Option<Vec<u8>>],
    vals: &mut OutBuf<'_>,
    vsizes: &mut [u64],
) -> KvResult<()> {
    let mut val_offset = 0;
    for i in 0..fetched.len() {
        match &fetched[i] {
            Some(value) => {
                if packed {
                    if vals.data.len() - val_offset < value.len() {
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
                        vals.data[val_offset..val_offset + value.len()].copy_from_slice(value);
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
    }
    vals.used = val_offset;
    Ok(())
}

/// Emit a matched listing into the caller's key buffers.
///
/// `exhausted` is true when the scan stopped because the engine ran out of
/// entries (rather than because the page filled up).
pub(crate) fn emit_keys(
    mode: Mode,
    packed: bool,
    matched: &[(Vec<u8>, Vec<u8>)],
    exhausted: bool,
    trim: usize,
    keys_out: &mut OutBuf<'_>,
    ksizes: &mut [u64],
) -> KvResult<()> {
    let max = ksizes.len();
    let mut key_offset = 0;
    let mut overflow = false;
    let mut i = 0;
    for (k, _) in matched {
        if i >= max {
            break;
        }
        let is_last = i + 1 == max || (i + 1 == matched.len() && exhausted);
        if packed {
            if overflow {
                ksizes[i] = SIZE_TOO_SMALL;
            } else {
                let emitted = key_copy(mode, &mut keys_out.data[key_offset..], k, trim, is_last);
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
                k,
                trim,
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

/// Emit a matched listing into the caller's key and value buffers, with
/// independent overflow tracking per buffer.
#[allow(clippy::too_many_arguments)]
pub(crate) fn emit_key_values(
    mode: Mode,
    packed: bool,
    matched: &[(Vec<u8>, Vec<u8>)],
    exhausted: bool,
    trim: usize,
    keys_out: &mut OutBuf<'_>,
    ksizes: &mut [u64],
    vals_out: &mut OutBuf<'_>,
    vsizes: &mut [u64],
) -> KvResult<()> {
    if ksizes.len() != vsizes.len() {
        return Err(KvError::InvalidArgs);
    }
    let max = ksizes.len();
    let mut key_offset = 0;
    let mut val_offset = 0;
    let mut key_overflow = false;
    let mut val_overflow = false;
    let mut i = 0;
    for (k, v) in matched {
        if i >= max {
            break;
        }
        let is_last = i + 1 == max || (i + 1 == matched.len() && exhausted);
        if packed {
            if key_overflow {
                ksizes[i] = SIZE_TOO_SMALL;
            } else {
                let emitted = key_copy(mode, &mut keys_out.data[key_offset..], k, trim, is_last);
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
                k,
                trim,
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

/// Scan decision shared by the disk listing closures: filter one entry.
pub(crate) enum ScanStep {
    Keep,
    Skip,
    Stop,
}

pub(crate) fn scan_step(filter: &Filter, key: &[u8], value: &[u8]) -> ScanStep {
    if filter.check(key, value) {
        ScanStep::Keep
    } else if filter.should_stop(key) {
        ScanStep::Stop
    } else {
        ScanStep::Skip
    }
}

/// Parse the config fields every disk backend shares: a required `path`
/// and an optional `writable` flag (default true).
pub(crate) fn complete_disk_config(cfg: &mut Map<String, Value>) -> KvResult<(String, bool)> {
    let path = match cfg.get("path") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::String(_)) | None => {
            return Err(KvError::InvalidConfig("path is required".into()))
        }
        Some(_) => return Err(KvError::InvalidConfig("path must be a string".into())),
    };
    let writable = match cfg.get("writable") {
        None => {
            cfg.insert("writable".into(), json!(true));
            true
        }
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(KvError::InvalidConfig("writable must be a boolean".into())),
    };
    Ok((path, writable))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_fetched_packed_overflow() {
        let fetched = vec![
            Some(b"0123456789".to_vec()),
            Some(b"x".to_vec()),
            None,
        ];
        let mut data = vec![0u8; 4];
        let mut vals = OutBuf::new(&mut data);
        let mut vsizes = vec![0u64; 3];
        emit_fetched(true, &fetched, &mut vals, &mut vsizes).unwrap();
        assert_eq!(vsizes, vec![SIZE_TOO_SMALL; 3]);
        assert_eq!(vals.used, 0);
    }

    #[test]
    fn test_emit_fetched_unpacked() {
        let fetched = vec![Some(b"abc".to_vec()), None, Some(b"toolong".to_vec())];
        let mut data = vec![0u8; 12];
        let mut vals = OutBuf::new(&mut data);
        let mut vsizes = vec![4u64, 4, 4];
        emit_fetched(false, &fetched, &mut vals, &mut vsizes).unwrap();
        assert_eq!(vsizes, vec![3, KEY_NOT_FOUND, SIZE_TOO_SMALL]);
        assert_eq!(&vals.data[..3], b"abc");
        assert_eq!(vals.used, 12);
    }

    #[test]
    fn test_emit_keys_marks_trailing_slots() {
        let matched = vec![(b"aa".to_vec(), vec![]), (b"bb".to_vec(), vec![])];
        let mut data = vec![0u8; 16];
        let mut keys_out = OutBuf::new(&mut data);
        let mut ksizes = vec![0u64; 4];
        emit_keys(Mode::NONE, true, &matched, true, 0, &mut keys_out, &mut ksizes).unwrap();
        assert_eq!(ksizes, vec![2, 2, NO_MORE_KEYS, NO_MORE_KEYS]);
        assert_eq!(&keys_out.data[..4], b"aabb");
    }

    #[test]
    fn test_complete_disk_config_requires_path() {
        let mut cfg = Map::new();
        assert!(matches!(
            complete_disk_config(&mut cfg),
            Err(KvError::InvalidConfig(_))
        ));

        let mut cfg = Map::new();
        cfg.insert("path".into(), json!("/tmp/db"));
        let (path, writable) = complete_disk_config(&mut cfg).unwrap();
        assert_eq!(path, "/tmp/db");
        assert!(writable);
        assert_eq!(cfg["writable"], json!(true));
    }
}
