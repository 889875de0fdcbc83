// SPDX-License-Identifier: PMPL-1.0-or-later
//
// `exists`: one presence bit per key.
//
// Bulk layout (offsets relative to `args.offset`):
//
// ```text
// [0 .. count*8)                 ksizes[]
// [count*8 .. +sum(ksizes))      packed key bytes
// [.. +ceil(count/8))            flags bit field (out)
// ```

use polystore_core::{batch, BitField, DatabaseId, KvError, KvResult, Mode};

use crate::handlers::{as_offset, ensure_no_empty_keys, offset_add, pull, push, sizes_len, BatchArgs};
use crate::provider::Provider;
use crate::transport::BulkRegion;

pub async fn exists_bulk(
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

    // Phase one: the size-array prefix.
    pull(region, args.offset, &mut buffer[..sizes_region]).await?;
    let ksizes = batch::decode_sizes(&buffer[..sizes_region], args.count)?;
    ensure_no_empty_keys(&ksizes)?;

    // Phase two: offsets, then the key bytes.
    let total_ksize = as_offset(batch::checked_total(&ksizes)?)?;
    let keys_offset = sizes_region;
    let flags_offset = offset_add(keys_offset, total_ksize)?;
    let flags_region = BitField::bytes_needed(args.count);
    if args.size < offset_add(flags_offset, flags_region)? {
        return Err(KvError::InvalidArgs);
    }
    pull(
        region,
        args.offset + keys_offset,
        &mut buffer[keys_offset..flags_offset],
    )
    .await?;

    // In-place views over the staging buffer.
    let (head, tail) = buffer.split_at_mut(flags_offset);
    let keys = &head[keys_offset..];
    let mut flags = BitField::new(&mut tail[..flags_region], args.count)?;
    flags.clear();

    database
        .backend()
        .exists(args.mode, keys, &ksizes, &mut flags)
        .await?;

    // Phase three: the bit field goes back to the caller.
    push(
        region,
        args.offset + flags_offset,
        &buffer[flags_offset..flags_offset + flags_region],
    )
    .await
}

/// Inline variant: arguments travel in the RPC body, the bit field comes
/// back in the response.
pub async fn exists_direct(
    provider: &Provider,
    db_id: &DatabaseId,
    mode: Mode,
    keys: &[u8],
    ksizes: &[u64],
) -> KvResult<Vec<u8>> {
    let database = provider.database(db_id).await?;
    database.check_mode(mode)?;
    ensure_no_empty_keys(ksizes)?;

    let mut flags_data = vec![0u8; BitField::bytes_needed(ksizes.len())];
    let mut flags = BitField::new(&mut flags_data, ksizes.len())?;
    flags.clear();
    database
        .backend()
        .exists(mode, keys, ksizes, &mut flags)
        .await?;
    Ok(flags_data)
}
