// SPDX-License-Identifier: PMPL-1.0-or-later
//
// `list_keyvals`: ordered key/value listing with filtering.
//
// Bulk layout: `ksizes[]`, `vsizes[]`, `key_buf_size` bytes of key space,
// `val_buf_size` bytes of value space. Three pushes carry the results
// back: both rewritten size arrays (contiguous), the emitted key bytes,
// and the emitted value bytes.

use polystore_core::{batch, DatabaseId, Filter, KvError, KvResult, Mode, OutBuf};

use crate::handlers::{as_offset, offset_add, pull, push, sizes_len, ListArgs};
use crate::provider::Provider;
use crate::transport::BulkRegion;

pub async fn list_key_values_bulk(
    provider: &Provider,
    args: &ListArgs,
    region: &dyn BulkRegion,
) -> KvResult<()> {
    let database = provider.database(&args.db_id).await?;
    database.check_mode(args.mode)?;
    let filter = Filter::new(args.mode, &args.filter)?;

    let mut buffer = provider.bulk_pool().get(args.size).await?;
    let sizes_region = sizes_len(args.count)?;
    let both_sizes = offset_add(sizes_region, sizes_region)?;
    let keys_offset = both_sizes;
    let vals_offset = offset_add(keys_offset, args.key_buf_size)?;
    let end = offset_add(vals_offset, args.val_buf_size)?;
    if args.size < end {
        return Err(KvError::InvalidArgs);
    }

    pull(region, args.offset, &mut buffer[..both_sizes]).await?;
    let mut ksizes = batch::decode_sizes(&buffer[..sizes_region], args.count)?;
    let mut vsizes = batch::decode_sizes(&buffer[sizes_region..both_sizes], args.count)?;

    let (keys_used, vals_used) = {
        let (key_space, val_space) = buffer[keys_offset..end].split_at_mut(args.key_buf_size);
        let mut keys_out = OutBuf::new(key_space);
        let mut vals_out = OutBuf::new(val_space);
        database
            .backend()
            .list_key_values(
                args.mode,
                args.packed,
                &args.from_key,
                &filter,
                &mut keys_out,
                &mut ksizes,
                &mut vals_out,
                &mut vsizes,
            )
            .await?;
        (keys_out.used, vals_out.used)
    };

    batch::encode_sizes(&ksizes, &mut buffer[..sizes_region])?;
    batch::encode_sizes(&vsizes, &mut buffer[sizes_region..both_sizes])?;
    push(region, args.offset, &buffer[..both_sizes]).await?;
    push(
        region,
        args.offset + keys_offset,
        &buffer[keys_offset..offset_add(keys_offset, keys_used)?],
    )
    .await?;
    push(
        region,
        args.offset + vals_offset,
        &buffer[vals_offset..offset_add(vals_offset, vals_used)?],
    )
    .await
}

/// Inline variant. Returns `(key bytes, ksizes, value bytes, vsizes)`.
#[allow(clippy::too_many_arguments)]
pub async fn list_key_values_direct(
    provider: &Provider,
    db_id: &DatabaseId,
    mode: Mode,
    packed: bool,
    from_key: &[u8],
    filter_bytes: &[u8],
    mut ksizes: Vec<u64>,
    mut vsizes: Vec<u64>,
    key_buf_size: usize,
    val_buf_size: usize,
) -> KvResult<(Vec<u8>, Vec<u64>, Vec<u8>, Vec<u64>)> {
    let database = provider.database(db_id).await?;
    database.check_mode(mode)?;
    let filter = Filter::new(mode, filter_bytes)?;

    let key_capacity = if packed {
        key_buf_size
    } else {
        as_offset(batch::checked_total(&ksizes)?)?
    };
    let val_capacity = if packed {
        val_buf_size
    } else {
        as_offset(batch::checked_total(&vsizes)?)?
    };
    let mut kdata = vec![0u8; key_capacity];
    let mut vdata = vec![0u8; val_capacity];
    let mut keys_out = OutBuf::new(&mut kdata);
    let mut vals_out = OutBuf::new(&mut vdata);
    database
        .backend()
        .list_key_values(
            mode,
            packed,
            from_key,
            &filter,
            &mut keys_out,
            &mut ksizes,
            &mut vals_out,
            &mut vsizes,
        )
        .await?;
    let keys_used = keys_out.used;
    let vals_used = vals_out.used;
    kdata.truncate(keys_used);
    vdata.truncate(vals_used);
    Ok((kdata, ksizes, vdata, vsizes))
}
