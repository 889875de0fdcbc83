// SPDX-License-Identifier: PMPL-1.0-or-later
//
// The uniform backend contract.
//
// Every backend, in-memory or disk-backed, exposes the same batched
// operation surface over packed byte blobs and u64 size arrays. Per-key
// conditions travel in-band as size sentinels (`KEY_NOT_FOUND`,
// `SIZE_TOO_SMALL`, `NO_MORE_KEYS`); structural problems (inconsistent
// sizes, exhausted buffers, arithmetic overflow) are out-of-band errors.

use std::time::Duration;

use async_trait::async_trait;
use polystore_core::{BitField, Filter, KvError, KvResult, Mode, OutBuf};

/// How long `WAIT` operations block on an absent key before the batch
/// fails with `Timeout`.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// A pluggable key/value (or key-only) storage backend.
///
/// Implementations must be safe to share across tasks; each database holds
/// one backend instance behind an `Arc`. Within one backend, operations are
/// linearizable with respect to its internal lock; inside a batch, keys are
/// processed left to right, and a failure at key *i* leaves keys `[0..i)`
/// committed.
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// The backend tag this instance was registered under (e.g. `"map"`).
    fn name(&self) -> &str;

    /// The configuration snapshot: the input config with defaults applied.
    fn config(&self) -> serde_json::Value;

    /// The set of mode bits this backend accepts.
    fn supported_modes(&self) -> Mode;

    /// True if every bit of `mode` is accepted.
    fn supports_mode(&self, mode: Mode) -> bool {
        mode.within(self.supported_modes())
    }

    /// Drop every entry; disk backends also unlink their backing storage.
    async fn destroy(&self) -> KvResult<()>;

    /// Number of entries.
    async fn count(&self, mode: Mode) -> KvResult<u64>;

    /// Set `flags[i]` to the presence of key *i*. Honors `WAIT`.
    async fn exists(
        &self,
        mode: Mode,
        keys: &[u8],
        ksizes: &[u64],
        flags: &mut BitField<'_>,
    ) -> KvResult<()>;

    /// Write each key's value length into `vsizes[i]`, `KEY_NOT_FOUND` for
    /// absent keys, 0 on set backends. Honors `WAIT`.
    async fn length(
        &self,
        mode: Mode,
        keys: &[u8],
        ksizes: &[u64],
        vsizes: &mut [u64],
    ) -> KvResult<()>;

    /// Insert, update, or append entries. Honors `NEW_ONLY`, `EXIST_ONLY`,
    /// `APPEND`, and `NOTIFY`. Set backends require every value size to be
    /// zero and fail `InvalidArgs` otherwise.
    async fn put(
        &self,
        mode: Mode,
        keys: &[u8],
        ksizes: &[u64],
        vals: &[u8],
        vsizes: &[u64],
    ) -> KvResult<()>;

    /// Read values into `vals`.
    ///
    /// Unpacked (`packed == false`): `vsizes[i]` carries the slot capacity
    /// on input and the value length (or a sentinel) on output; the output
    /// region advances by the slot capacity regardless of outcome.
    ///
    /// Packed: values are placed back to back; once a value does not fit,
    /// every remaining slot reports `SIZE_TOO_SMALL` and nothing more is
    /// copied. `vals.used` reports the bytes written.
    ///
    /// Honors `CONSUME` (erase after read) and `WAIT`.
    async fn get(
        &self,
        mode: Mode,
        packed: bool,
        keys: &[u8],
        ksizes: &[u64],
        vals: &mut OutBuf<'_>,
        vsizes: &mut [u64],
    ) -> KvResult<()>;

    /// Remove keys. Missing keys are not an error, except under `WAIT`,
    /// which blocks until the key appears so it can be erased.
    async fn erase(&self, mode: Mode, keys: &[u8], ksizes: &[u64]) -> KvResult<()>;

    /// List keys in comparator order starting after (or at, under
    /// `INCLUSIVE`) `from_key`, applying `filter`. Fills up to
    /// `ksizes.len()` entries; trailing slots get `NO_MORE_KEYS`. Honors
    /// `IGNORE_KEYS`, `KEEP_LAST`, `NO_PREFIX`, `SUFFIX`.
    ///
    /// Unordered backends do not support listings.
    async fn list_keys(
        &self,
        _mode: Mode,
        _packed: bool,
        _from_key: &[u8],
        _filter: &Filter,
        _keys: &mut OutBuf<'_>,
        _ksizes: &mut [u64],
    ) -> KvResult<()> {
        Err(KvError::OpUnsupported)
    }

    /// Same as [`DatabaseBackend::list_keys`], with values.
    #[allow(clippy::too_many_arguments)]
    async fn list_key_values(
        &self,
        _mode: Mode,
        _packed: bool,
        _from_key: &[u8],
        _filter: &Filter,
        _keys: &mut OutBuf<'_>,
        _ksizes: &mut [u64],
        _vals: &mut OutBuf<'_>,
        _vsizes: &mut [u64],
    ) -> KvResult<()> {
        Err(KvError::OpUnsupported)
    }
}
