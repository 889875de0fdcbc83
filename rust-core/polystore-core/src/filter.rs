// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Key filters and listing emission helpers.
//
// A filter is constructed once per list request from the mode word and the
// filter bytes: a prefix blob by default, a suffix blob under `SUFFIX`, or
// the name of a registered predicate under `LUA_FILTER`/`LIB_FILTER`.
// Ordered backends additionally consult `should_stop` to cut a scan short
// once the filter's ordered domain has been exited.

use std::sync::Arc;

use crate::batch::SIZE_TOO_SMALL;
use crate::error::{KvError, KvResult};
use crate::modes::Mode;
use crate::registry::{self, FilterPredicate};

/// A predicate over keys (and values) applied by list operations.
#[derive(Clone)]
pub struct Filter {
    mode: Mode,
    bytes: Vec<u8>,
    predicate: Option<Arc<dyn FilterPredicate>>,
}

impl Filter {
    /// Build a filter from the request's mode word and filter bytes.
    ///
    /// Under `LUA_FILTER` or `LIB_FILTER` the bytes are the name of a
    /// predicate registered by the host; an unknown name is `InvalidArgs`.
    pub fn new(mode: Mode, bytes: &[u8]) -> KvResult<Self> {
        let predicate = if mode.contains(Mode::LUA_FILTER) || mode.contains(Mode::LIB_FILTER) {
            let name = std::str::from_utf8(bytes).map_err(|_| KvError::InvalidArgs)?;
            let pred =
                registry::lookup_filter_predicate(name).ok_or(KvError::InvalidArgs)?;
            Some(pred)
        } else {
            None
        };
        Ok(Self {
            mode,
            bytes: bytes.to_vec(),
            predicate,
        })
    }

    /// The number of key bytes elided by `NO_PREFIX` trimming.
    ///
    /// Zero for predicate filters: their bytes name a predicate and are not
    /// part of any key.
    pub fn trim_len(&self) -> usize {
        if self.predicate.is_some() {
            0
        } else {
            self.bytes.len()
        }
    }

    /// True if `key` (and `value`) pass the filter. An empty blob filter
    /// matches everything.
    pub fn check(&self, key: &[u8], value: &[u8]) -> bool {
        if let Some(pred) = &self.predicate {
            return pred.check(key, value);
        }
        if self.bytes.len() > key.len() {
            return false;
        }
        if self.mode.contains(Mode::SUFFIX) {
            key.ends_with(&self.bytes)
        } else {
            key.starts_with(&self.bytes)
        }
    }

    /// True once an ascending scan has left the filter's domain and no
    /// later key can match.
    ///
    /// Only a plain prefix filter bounds an ordered scan; suffix and
    /// predicate filters can match anywhere.
    pub fn should_stop(&self, key: &[u8]) -> bool {
        if self.predicate.is_some() || self.mode.contains(Mode::SUFFIX) || self.bytes.is_empty() {
            return false;
        }
        let n = self.bytes.len().min(key.len());
        key[..n] > self.bytes[..n]
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("mode", &self.mode)
            .field("bytes", &self.bytes)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Copy a key into `dst` according to the mode, eliding the filter bytes or
/// skipping the copy entirely as requested.
///
/// Returns the emitted size, `0` when `IGNORE_KEYS` suppresses the copy
/// (unless this is the last record and `KEEP_LAST` is set), or
/// `SIZE_TOO_SMALL` when `dst` cannot hold the emission.
pub fn key_copy(
    mode: Mode,
    dst: &mut [u8],
    key: &[u8],
    filter_size: usize,
    is_last: bool,
) -> u64 {
    if mode.contains(Mode::IGNORE_KEYS) && !(is_last && mode.contains(Mode::KEEP_LAST)) {
        return 0;
    }
    if !mode.contains(Mode::NO_PREFIX) {
        if dst.len() < key.len() {
            return SIZE_TOO_SMALL;
        }
        dst[..key.len()].copy_from_slice(key);
        return key.len() as u64;
    }
    // Trim the matched filter bytes off the emission.
    let emitted = key.len().saturating_sub(filter_size);
    if dst.len() < emitted {
        return SIZE_TOO_SMALL;
    }
    if mode.contains(Mode::SUFFIX) {
        dst[..emitted].copy_from_slice(&key[..emitted]);
    } else {
        dst[..emitted].copy_from_slice(&key[filter_size..]);
    }
    emitted as u64
}

/// Copy a value into `dst`, reporting `SIZE_TOO_SMALL` on overflow.
pub fn val_copy(dst: &mut [u8], val: &[u8]) -> u64 {
    if dst.len() < val.len() {
        return SIZE_TOO_SMALL;
    }
    dst[..val.len()].copy_from_slice(val);
    val.len() as u64
}
