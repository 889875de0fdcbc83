// SPDX-License-Identifier: PMPL-1.0-or-later
//
// `put`: insert/update/append a batch of entries. Nothing is pushed back.
//
// Bulk layout: `ksizes[]`, `vsizes[]`, packed key bytes, packed value
// bytes.

use polystore_core::{batch, DatabaseId, KvError, KvResult, Mode};

use crate::handlers::{as_offset, ensure_no_empty_keys, offset_add, pull, sizes_len, BatchArgs};
use crate::provider::Provider;
use crate::transport::BulkRegion;

pub async fn put_bulk(
    provider: &Provider,
    args: &BatchArgs,
    region: &dyn BulkRegion,
) -> KvResult<()> {
    let database = provider.database(&args.db_id).await?;
    database.check_mode(args.mode)?;

    let mut buffer = provider.bulk_pool().get(args.size).await?;
    let sizes_region = sizes_len(args.count)?;
    let both_sizes = offset_add(sizes_region, sizes_region)?;
    if args.size < both_sizes {
        return Err(KvError::InvalidArgs);
    }

    pull(region, args.offset, &mut buffer[..both_sizes]).await?;
    let ksizes = batch::decode_sizes(&buffer[..sizes_region], args.count)?;
    let vsizes = batch::decode_sizes(&buffer[sizes_region..both_sizes], args.count)?;
    ensure_no_empty_keys(&ksizes)?;

    let total_ksize = as_offset(batch::checked_total(&ksizes)?)?;
    let total_vsize = as_offset(batch::checked_total(&vsizes)?)?;
    let keys_offset = both_sizes;
    let vals_offset = offset_add(keys_offset, total_ksize)?;
    let end = offset_add(vals_offset, total_vsize)?;
    if args.size < end {
        return Err(KvError::InvalidArgs);
    }
    pull(
        region,
        args.offset + keys_offset,
        &mut buffer[keys_offset..end],
    )
    .await?;

    let keys = &buffer[keys_offset..vals_offset];
    let vals = &buffer[vals_offset..end];
    database
        .backend()
        .put(args.mode, keys, &ksizes, vals, &vsizes)
        .await
}

/// Inline variant.
pub async fn put_direct(
    provider: &Provider,
    db_id: &DatabaseId,
    mode: Mode,
    keys: &[u8],
    ksizes: &[u64],
    vals: &[u8],
    vsizes: &[u64],
) -> KvResult<()> {
    let database = provider.database(db_id).await?;
    database.check_mode(mode)?;
    ensure_no_empty_keys(ksizes)?;
    database.backend().put(mode, keys, ksizes, vals, vsizes).await
}
