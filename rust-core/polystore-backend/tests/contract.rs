// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Contract tests exercised against the in-memory backends: listing
// semantics, pagination, filter trimming, and comparator selection.

use std::sync::Arc;

use polystore_backend::{DatabaseBackend, MapBackend, SetBackend};
use polystore_core::{registry, Filter, Mode, OutBuf, NO_MORE_KEYS};
use serde_json::json;

fn pack(items: &[&[u8]]) -> (Vec<u8>, Vec<u64>) {
    let blob = items.concat();
    let sizes = items.iter().map(|i| i.len() as u64).collect();
    (blob, sizes)
}

async fn put_pairs(db: &Arc<dyn DatabaseBackend>, pairs: &[(&str, &str)]) {
    let keys: Vec<&[u8]> = pairs.iter().map(|(k, _)| k.as_bytes()).collect();
    let vals: Vec<&[u8]> = pairs.iter().map(|(_, v)| v.as_bytes()).collect();
    let (kblob, ksizes) = pack(&keys);
    let (vblob, vsizes) = pack(&vals);
    db.put(Mode::NONE, &kblob, &ksizes, &vblob, &vsizes)
        .await
        .unwrap();
}

/// Run one packed `list_keys` page and decode the emitted keys.
async fn list_page(
    db: &Arc<dyn DatabaseBackend>,
    mode: Mode,
    from_key: &[u8],
    filter: &Filter,
    page: usize,
) -> (Vec<Vec<u8>>, bool) {
    let mut kdata = vec![0u8; 4096];
    let mut keys_out = OutBuf::new(&mut kdata);
    let mut ksizes = vec![0u64; page];
    db.list_keys(mode, true, from_key, filter, &mut keys_out, &mut ksizes)
        .await
        .unwrap();
    let mut keys = Vec::new();
    let mut offset = 0;
    let mut exhausted = false;
    for &size in &ksizes {
        if size == NO_MORE_KEYS {
            exhausted = true;
            break;
        }
        keys.push(keys_out.data[offset..offset + size as usize].to_vec());
        offset += size as usize;
    }
    (keys, exhausted)
}

#[tokio::test]
async fn test_prefix_listing_with_and_without_trimming() {
    let db = MapBackend::open(&json!({})).unwrap();
    put_pairs(
        &db,
        &[
            ("alpha", "1"),
            ("apple", "2"),
            ("apricot", "3"),
            ("banana", "4"),
            ("beta", "5"),
        ],
    )
    .await;

    let filter = Filter::new(Mode::NONE, b"ap").unwrap();
    let (keys, _) = list_page(&db, Mode::NONE, b"", &filter, 10).await;
    assert_eq!(keys, vec![b"apple".to_vec(), b"apricot".to_vec()]);

    let filter = Filter::new(Mode::NO_PREFIX, b"ap").unwrap();
    let (keys, _) = list_page(&db, Mode::NO_PREFIX, b"", &filter, 10).await;
    assert_eq!(keys, vec![b"ple".to_vec(), b"ricot".to_vec()]);
}

#[tokio::test]
async fn test_suffix_listing() {
    let db = MapBackend::open(&json!({})).unwrap();
    put_pairs(&db, &[("goblet", "1"), ("letter", "2"), ("tablet", "3")]).await;

    let mode = Mode::SUFFIX;
    let filter = Filter::new(mode, b"let").unwrap();
    let (keys, _) = list_page(&db, mode, b"", &filter, 10).await;
    assert_eq!(keys, vec![b"goblet".to_vec(), b"tablet".to_vec()]);

    let mode = Mode::SUFFIX | Mode::NO_PREFIX;
    let filter = Filter::new(mode, b"let").unwrap();
    let (keys, _) = list_page(&db, mode, b"", &filter, 10).await;
    assert_eq!(keys, vec![b"gob".to_vec(), b"tab".to_vec()]);
}

#[tokio::test]
async fn test_resumable_pagination_covers_all_keys_without_duplicates() {
    // 100 keys, 6 per page, exclusive resume from the last returned key.
    let db = SetBackend::open(&json!({})).unwrap();
    let all: Vec<String> = (0..100).map(|i| format!("key{i:03}")).collect();
    for key in &all {
        let (kblob, ksizes) = pack(&[key.as_bytes()]);
        db.put(Mode::NONE, &kblob, &ksizes, b"", &[0]).await.unwrap();
    }

    let filter = Filter::new(Mode::NONE, b"").unwrap();
    let mut seen: Vec<Vec<u8>> = Vec::new();
    let mut from: Vec<u8> = Vec::new();
    loop {
        let (keys, exhausted) = list_page(&db, Mode::NONE, &from, &filter, 6).await;
        seen.extend(keys);
        if exhausted {
            break;
        }
        from = seen.last().unwrap().clone();
    }
    let seen: Vec<String> = seen
        .into_iter()
        .map(|k| String::from_utf8(k).unwrap())
        .collect();
    assert_eq!(seen, all);
}

#[tokio::test]
async fn test_inclusive_bound_repeats_resume_key() {
    let db = MapBackend::open(&json!({})).unwrap();
    put_pairs(&db, &[("a", "1"), ("b", "2"), ("c", "3")]).await;
    let filter = Filter::new(Mode::NONE, b"").unwrap();

    let (keys, _) = list_page(&db, Mode::INCLUSIVE, b"b", &filter, 10).await;
    assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);

    let (keys, _) = list_page(&db, Mode::NONE, b"b", &filter, 10).await;
    assert_eq!(keys, vec![b"c".to_vec()]);
}

#[tokio::test]
async fn test_ignore_keys_keep_last_supports_cheap_resume() {
    let db = MapBackend::open(&json!({})).unwrap();
    let pairs: Vec<(String, String)> = (0..10)
        .map(|i| (format!("k{i:02}"), format!("v{i}")))
        .collect();
    let borrowed: Vec<(&str, &str)> = pairs
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    put_pairs(&db, &borrowed).await;

    let mode = Mode::IGNORE_KEYS | Mode::KEEP_LAST;
    let filter = Filter::new(mode, b"").unwrap();
    let mut kdata = vec![0u8; 256];
    let mut keys_out = OutBuf::new(&mut kdata);
    let mut ksizes = vec![0u64; 4];
    db.list_keys(mode, true, b"", &filter, &mut keys_out, &mut ksizes)
        .await
        .unwrap();

    // Every key elided except the page's last, which carries its true bytes.
    assert_eq!(ksizes, vec![0, 0, 0, 3]);
    assert_eq!(&keys_out.data[..3], b"k03");
    assert_eq!(keys_out.used, 3);
}

#[tokio::test]
async fn test_list_key_values_returns_both() {
    let db = MapBackend::open(&json!({})).unwrap();
    put_pairs(&db, &[("apple", "red"), ("banana", "yellow")]).await;

    let filter = Filter::new(Mode::NONE, b"").unwrap();
    let mut kdata = vec![0u8; 64];
    let mut keys_out = OutBuf::new(&mut kdata);
    let mut vdata = vec![0u8; 64];
    let mut vals_out = OutBuf::new(&mut vdata);
    let mut ksizes = vec![0u64; 3];
    let mut vsizes = vec![0u64; 3];
    db.list_key_values(
        Mode::NONE,
        true,
        b"",
        &filter,
        &mut keys_out,
        &mut ksizes,
        &mut vals_out,
        &mut vsizes,
    )
    .await
    .unwrap();

    assert_eq!(ksizes, vec![5, 6, NO_MORE_KEYS]);
    assert_eq!(vsizes, vec![3, 6, NO_MORE_KEYS]);
    assert_eq!(&keys_out.data[..11], b"applebanana");
    assert_eq!(&vals_out.data[..9], b"redyellow");
}

#[tokio::test]
async fn test_registered_predicate_drives_listing() {
    struct OddValue;
    impl registry::FilterPredicate for OddValue {
        fn check(&self, _key: &[u8], value: &[u8]) -> bool {
            value.len() % 2 == 1
        }
    }
    registry::register_filter_predicate("contract-odd", Arc::new(OddValue));

    let db = MapBackend::open(&json!({})).unwrap();
    put_pairs(&db, &[("a", "x"), ("b", "xx"), ("c", "xxx")]).await;

    let mode = Mode::LIB_FILTER;
    let filter = Filter::new(mode, b"contract-odd").unwrap();
    let (keys, _) = list_page(&db, mode, b"", &filter, 10).await;
    assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);
}

#[tokio::test]
async fn test_custom_comparator_orders_listing() {
    fn reversed(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        b.cmp(a)
    }
    registry::register_comparator("contract-reversed", reversed);

    let db = MapBackend::open(&json!({"comparator": "contract-reversed"})).unwrap();
    put_pairs(&db, &[("a", "1"), ("b", "2"), ("c", "3")]).await;

    let filter = Filter::new(Mode::NONE, b"").unwrap();
    let (keys, _) = list_page(&db, Mode::NONE, b"", &filter, 10).await;
    assert_eq!(keys, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
}

#[tokio::test]
async fn test_unpacked_listing_uses_slot_capacities() {
    let db = MapBackend::open(&json!({})).unwrap();
    put_pairs(&db, &[("aa", "1"), ("bbbb", "2")]).await;

    let filter = Filter::new(Mode::NONE, b"").unwrap();
    let mut kdata = vec![0u8; 6];
    let mut keys_out = OutBuf::new(&mut kdata);
    // Slot capacities: 3 bytes each; "bbbb" does not fit its slot.
    let mut ksizes = vec![3u64, 3];
    db.list_keys(Mode::NONE, false, b"", &filter, &mut keys_out, &mut ksizes)
        .await
        .unwrap();
    assert_eq!(ksizes[0], 2);
    assert_eq!(ksizes[1], polystore_core::SIZE_TOO_SMALL);
    assert_eq!(&keys_out.data[..2], b"aa");
    // The second slot's region is untouched beyond its capacity.
    assert_eq!(keys_out.used, 6);
}

#[tokio::test]
async fn test_mode_masks_differ_by_backend_shape() {
    let map = MapBackend::open(&json!({})).unwrap();
    let set = SetBackend::open(&json!({})).unwrap();
    assert!(map.supports_mode(Mode::INCLUSIVE | Mode::KEEP_LAST));
    assert!(set.supports_mode(Mode::INCLUSIVE | Mode::KEEP_LAST));
    assert!(map.supports_mode(Mode::WAIT | Mode::NOTIFY));
    // Reserved document bits are not claimed by the K/V backends.
    assert!(!map.supports_mode(Mode::IGNORE_DOCS));
    assert!(!set.supports_mode(Mode::FILTER_VALUE));
}
