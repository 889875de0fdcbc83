// SPDX-License-Identifier: PMPL-1.0-or-later
//
// `erase`: remove a batch of keys. Nothing is pushed back.
//
// Bulk layout: `ksizes[]`, packed key bytes.

use polystore_core::{batch, DatabaseId, KvError, KvResult, Mode};

use crate::handlers::{as_offset, ensure_no_empty_keys, offset_add, pull, sizes_len, BatchArgs};
use crate::provider::Provider;
use crate::transport::BulkRegion;

pub async fn erase_bulk(
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
    let end = offset_add(keys_offset, total_ksize)?;
    if args.size < end {
        return Err(KvError::InvalidArgs);
    }
    pull(
        region,
        args.offset + keys_offset,
        &mut buffer[keys_offset..end],
    )
    .await?;

    let keys = &buffer[keys_offset..end];
    database.backend().erase(args.mode, keys, &ksizes).await
}

/// Inline variant.
pub async fn erase_direct(
    provider: &Provider,
    db_id: &DatabaseId,
    mode: Mode,
    keys: &[u8],
    ksizes: &[u64],
) -> KvResult<()> {
    let database = provider.database(db_id).await?;
    database.check_mode(mode)?;
    ensure_no_empty_keys(ksizes)?;
    database.backend().erase(mode, keys, ksizes).await
}
