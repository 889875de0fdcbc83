// SPDX-License-Identifier: PMPL-1.0-or-later
//
// `get`: read a batch of values.
//
// Bulk layout: `ksizes[]`, packed key bytes, `vsizes[]` (slot capacities in
// the unpacked discipline, out-only in the packed one), then the value
// space. The result push covers the rewritten `vsizes[]` and the bytes the
// backend produced.

use polystore_core::{batch, DatabaseId, KvError, KvResult, Mode, OutBuf};

use crate::handlers::{as_offset, ensure_no_empty_keys, offset_add, pull, push, sizes_len, GetArgs};
use crate::provider::Provider;
use crate::transport::BulkRegion;

pub async fn get_bulk(
    provider: &Provider,
    args: &GetArgs,
    region: &dyn BulkRegion,
) -> KvResult<()> {
    let database = provider.database(&args.db_id).await?;
    database.check_mode(args.mode)?;

    let mut buffer = provider.bulk_pool().get(args.size).await?;
    let sizes_region = sizes_len(args.count)?;
    if args.size < sizes_region {
        return Err(KvError::InvalidArgs);
    }

    pull(region, args.offset, &mut buffer[..sizes_region]).await?;
    let ksizes = batch::decode_sizes(&buffer[..sizes_region], args.count)?;
    ensure_no_empty_keys(&ksizes)?;

    let total_ksize = as_offset(batch::checked_total(&ksizes)?)?;
    let keys_offset = sizes_region;
    let vsizes_offset = offset_add(keys_offset, total_ksize)?;
    let vals_offset = offset_add(vsizes_offset, sizes_region)?;
    if args.size < vals_offset {
        return Err(KvError::InvalidArgs);
    }

    pull(
        region,
        args.offset + keys_offset,
        &mut buffer[keys_offset..vsizes_offset],
    )
    .await?;
    pull(
        region,
        args.offset + vsizes_offset,
        &mut buffer[vsizes_offset..vals_offset],
    )
    .await?;
    let mut vsizes = batch::decode_sizes(&buffer[vsizes_offset..vals_offset], args.count)?;

    let vals_used = {
        let (head, tail) = buffer.split_at_mut(vals_offset);
        let keys = &head[keys_offset..vsizes_offset];
        let mut vals = OutBuf::new(tail);
        database
            .backend()
            .get(args.mode, args.packed, keys, &ksizes, &mut vals, &mut vsizes)
            .await?;
        vals.used
    };

    batch::encode_sizes(&vsizes, &mut buffer[vsizes_offset..vals_offset])?;
    push(
        region,
        args.offset + vsizes_offset,
        &buffer[vsizes_offset..vals_offset + vals_used],
    )
    .await
}

/// Inline variant.
///
/// For the unpacked discipline, `vsizes` carries the slot capacities and
/// the value buffer is their sum; for the packed discipline, the value
/// buffer is `val_buf_size` bytes. Returns the value bytes actually
/// produced and the rewritten size array.
#[allow(clippy::too_many_arguments)]
pub async fn get_direct(
    provider: &Provider,
    db_id: &DatabaseId,
    mode: Mode,
    packed: bool,
    keys: &[u8],
    ksizes: &[u64],
    mut vsizes: Vec<u64>,
    val_buf_size: usize,
) -> KvResult<(Vec<u8>, Vec<u64>)> {
    let database = provider.database(db_id).await?;
    database.check_mode(mode)?;
    ensure_no_empty_keys(ksizes)?;

    let capacity = if packed {
        val_buf_size
    } else {
        as_offset(batch::checked_total(&vsizes)?)?
    };
    let mut vdata = vec![0u8; capacity];
    let mut vals = OutBuf::new(&mut vdata);
    database
        .backend()
        .get(mode, packed, keys, ksizes, &mut vals, &mut vsizes)
        .await?;
    let used = vals.used;
    vdata.truncate(used);
    Ok((vdata, vsizes))
}
