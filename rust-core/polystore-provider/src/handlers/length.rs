// SPDX-License-Identifier: PMPL-1.0-or-later
//
// `length`: one value size (or `KEY_NOT_FOUND`) per key.
//
// Bulk layout: `ksizes[]`, packed key bytes, then the `vsizes[]` result
// region.

use polystore_core::{batch, DatabaseId, KvError, KvResult, Mode};

use crate::handlers::{as_offset, ensure_no_empty_keys, offset_add, pull, push, sizes_len, BatchArgs};
use crate::provider::Provider;
use crate::transport::BulkRegion;

pub async fn length_bulk(
    provider: &Provider,
    args: &BatchArgs,
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
    if args.size < offset_add(vsizes_offset, sizes_region)? {
        return Err(KvError::InvalidArgs);
    }
    pull(
        region,
        args.offset + keys_offset,
        &mut buffer[keys_offset..vsizes_offset],
    )
    .await?;

    let keys = &buffer[keys_offset..vsizes_offset];
    let mut vsizes = vec![0u64; args.count];
    database
        .backend()
        .length(args.mode, keys, &ksizes, &mut vsizes)
        .await?;

    batch::encode_sizes(&vsizes, &mut buffer[vsizes_offset..vsizes_offset + sizes_region])?;
    push(
        region,
        args.offset + vsizes_offset,
        &buffer[vsizes_offset..vsizes_offset + sizes_region],
    )
    .await
}

/// Inline variant: returns the value sizes.
pub async fn length_direct(
    provider: &Provider,
    db_id: &DatabaseId,
    mode: Mode,
    keys: &[u8],
    ksizes: &[u64],
) -> KvResult<Vec<u64>> {
    let database = provider.database(db_id).await?;
    database.check_mode(mode)?;
    ensure_no_empty_keys(ksizes)?;

    let mut vsizes = vec![0u64; ksizes.len()];
    database
        .backend()
        .length(mode, keys, ksizes, &mut vsizes)
        .await?;
    Ok(vsizes)
}
