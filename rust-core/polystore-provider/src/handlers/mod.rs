// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Bulk and direct operation handlers.
//
// Each bulk handler runs the same three-phase dance against the client's
// bulk region: pull the size-array prefix, validate and compute the region
// offsets, pull the payload, invoke the backend on in-place views over the
// staging buffer, and push the result regions back. Direct variants take
// their arguments inline and return owned results; they suit small batches.
//
// Out-of-band failures short-circuit the remaining transfers; the staging
// buffer returns to the pool on every path.

pub mod count;
pub mod erase;
pub mod exists;
pub mod get;
pub mod length;
pub mod list_key_values;
pub mod list_keys;
pub mod put;

pub use count::count;
pub use erase::{erase_bulk, erase_direct};
pub use exists::{exists_bulk, exists_direct};
pub use get::{get_bulk, get_direct};
pub use length::{length_bulk, length_direct};
pub use list_key_values::{list_key_values_bulk, list_key_values_direct};
pub use list_keys::{list_keys_bulk, list_keys_direct};
pub use put::{put_bulk, put_direct};

use polystore_core::batch::SIZE_WIDTH;
use polystore_core::{DatabaseId, KvError, KvResult, Mode};
use tracing::error;

use crate::transport::BulkRegion;

/// Arguments common to the bulk batch operations.
///
/// `offset` and `size` delimit the request's image inside the client's bulk
/// region; `count` is the number of keys in the batch.
#[derive(Debug, Clone)]
pub struct BatchArgs {
    pub db_id: DatabaseId,
    pub mode: Mode,
    pub count: usize,
    pub offset: usize,
    pub size: usize,
}

/// Arguments for the bulk `get` operation.
#[derive(Debug, Clone)]
pub struct GetArgs {
    pub db_id: DatabaseId,
    pub mode: Mode,
    pub packed: bool,
    pub count: usize,
    pub offset: usize,
    pub size: usize,
}

/// Arguments for the bulk listing operations. `from_key` and the filter
/// bytes travel inline; the bulk region carries the size arrays and the
/// output space (`key_buf_size` / `val_buf_size` bytes).
#[derive(Debug, Clone)]
pub struct ListArgs {
    pub db_id: DatabaseId,
    pub mode: Mode,
    pub packed: bool,
    pub count: usize,
    pub from_key: Vec<u8>,
    pub filter: Vec<u8>,
    pub offset: usize,
    pub size: usize,
    pub key_buf_size: usize,
    pub val_buf_size: usize,
}

/// Width of a `count`-slot size array on the wire.
pub(crate) fn sizes_len(count: usize) -> KvResult<usize> {
    count.checked_mul(SIZE_WIDTH).ok_or(KvError::InvalidArgs)
}

/// Batches must not carry zero-length keys.
pub(crate) fn ensure_no_empty_keys(ksizes: &[u64]) -> KvResult<()> {
    if ksizes.iter().any(|&s| s == 0) {
        return Err(KvError::InvalidArgs);
    }
    Ok(())
}

/// Pull through the region, logging transport failures.
pub(crate) async fn pull(
    region: &dyn BulkRegion,
    offset: usize,
    dst: &mut [u8],
) -> KvResult<()> {
    region.pull(offset, dst).await.map_err(|e| {
        error!(error = %e, offset, len = dst.len(), "bulk pull failed");
        e
    })
}

/// Push through the region, logging transport failures.
pub(crate) async fn push(region: &dyn BulkRegion, offset: usize, src: &[u8]) -> KvResult<()> {
    region.push(offset, src).await.map_err(|e| {
        error!(error = %e, offset, len = src.len(), "bulk push failed");
        e
    })
}

/// Checked `a + b` that treats overflow as a malformed request.
pub(crate) fn offset_add(a: usize, b: usize) -> KvResult<usize> {
    a.checked_add(b).ok_or(KvError::InvalidArgs)
}

/// Convert a u64 byte total into a usize offset.
pub(crate) fn as_offset(total: u64) -> KvResult<usize> {
    usize::try_from(total).map_err(|_| KvError::InvalidArgs)
}
