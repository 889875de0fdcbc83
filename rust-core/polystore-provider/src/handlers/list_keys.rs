// SPDX-License-Identifier: PMPL-1.0-or-later
//
// `list_keys`: ordered key listing with filtering.
//
// Bulk layout: `ksizes[]` (slot capacities in the unpacked discipline,
// out-only in the packed one), then `key_buf_size` bytes of key space.
// `from_key` and the filter bytes travel inline in the request. The result
// push covers the rewritten `ksizes[]` and the emitted key bytes, which
// are contiguous.

use polystore_core::{batch, DatabaseId, Filter, KvError, KvResult, Mode, OutBuf};

use crate::handlers::{as_offset, offset_add, pull, push, sizes_len, ListArgs};
use crate::provider::Provider;
use crate::transport::BulkRegion;

pub async fn list_keys_bulk(
    provider: &Provider,
    args: &ListArgs,
    region: &dyn BulkRegion,
) -> KvResult<()> {
    let database = provider.database(&args.db_id).await?;
    database.check_mode(args.mode)?;
    let filter = Filter::new(args.mode, &args.filter)?;

    let mut buffer = provider.bulk_pool().get(args.size).await?;
    let sizes_region = sizes_len(args.count)?;
    let keys_offset = sizes_region;
    let end = offset_add(keys_offset, args.key_buf_size)?;
    if args.size < end {
        return Err(KvError::InvalidArgs);
    }

    pull(region, args.offset, &mut buffer[..sizes_region]).await?;
    let mut ksizes = batch::decode_sizes(&buffer[..sizes_region], args.count)?;

    let keys_used = {
        let mut keys_out = OutBuf::new(&mut buffer[keys_offset..end]);
        database
            .backend()
            .list_keys(
                args.mode,
                args.packed,
                &args.from_key,
                &filter,
                &mut keys_out,
                &mut ksizes,
            )
            .await?;
        keys_out.used
    };

    batch::encode_sizes(&ksizes, &mut buffer[..sizes_region])?;
    // Sizes and emitted keys are contiguous; one push covers both.
    push(
        region,
        args.offset,
        &buffer[..offset_add(keys_offset, keys_used)?],
    )
    .await
}

/// Inline variant.
///
/// For the unpacked discipline, `ksizes` carries the slot capacities and
/// the key buffer is their sum; for the packed discipline, the key buffer
/// is `key_buf_size` bytes. Returns the emitted key bytes and the
/// rewritten size array.
#[allow(clippy::too_many_arguments)]
pub async fn list_keys_direct(
    provider: &Provider,
    db_id: &DatabaseId,
    mode: Mode,
    packed: bool,
    from_key: &[u8],
    filter_bytes: &[u8],
    mut ksizes: Vec<u64>,
    key_buf_size: usize,
) -> KvResult<(Vec<u8>, Vec<u64>)> {
    let database = provider.database(db_id).await?;
    database.check_mode(mode)?;
    let filter = Filter::new(mode, filter_bytes)?;

    let capacity = if packed {
        key_buf_size
    } else {
        as_offset(batch::checked_total(&ksizes)?)?
    };
    let mut kdata = vec![0u8; capacity];
    let mut keys_out = OutBuf::new(&mut kdata);
    database
        .backend()
        .list_keys(mode, packed, from_key, &filter, &mut keys_out, &mut ksizes)
        .await?;
    let used = keys_out.used;
    kdata.truncate(used);
    Ok((kdata, ksizes))
}
