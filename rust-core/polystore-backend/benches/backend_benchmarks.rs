// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for the in-memory backends.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tokio::runtime::Runtime;

use polystore_backend::{DatabaseBackend, MapBackend};
use polystore_core::{Filter, Mode, OutBuf};

fn pack(items: &[&[u8]]) -> (Vec<u8>, Vec<u64>) {
    let blob = items.concat();
    let sizes = items.iter().map(|i| i.len() as u64).collect();
    (blob, sizes)
}

fn bench_map_put_get(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("map");

    const BATCH: usize = 64;
    let keys: Vec<String> = (0..BATCH).map(|i| format!("bench-key-{i:05}")).collect();
    let key_refs: Vec<&[u8]> = keys.iter().map(|k| k.as_bytes()).collect();
    let (kblob, ksizes) = pack(&key_refs);
    let vals: Vec<&[u8]> = (0..BATCH).map(|_| b"value-payload".as_ref()).collect();
    let (vblob, vsizes) = pack(&vals);

    group.throughput(Throughput::Elements(BATCH as u64));
    group.bench_function("put_batch_64", |b| {
        let db = MapBackend::open(&serde_json::json!({})).unwrap();
        b.to_async(&rt).iter(|| async {
            black_box(
                db.put(Mode::NONE, &kblob, &ksizes, &vblob, &vsizes)
                    .await
                    .unwrap(),
            )
        });
    });

    group.bench_function("get_batch_64_packed", |b| {
        let db = MapBackend::open(&serde_json::json!({})).unwrap();
        rt.block_on(async {
            db.put(Mode::NONE, &kblob, &ksizes, &vblob, &vsizes)
                .await
                .unwrap();
        });
        b.to_async(&rt).iter(|| async {
            let mut vdata = vec![0u8; BATCH * 16];
            let mut out = OutBuf::new(&mut vdata);
            let mut out_sizes = vec![0u64; BATCH];
            db.get(Mode::NONE, true, &kblob, &ksizes, &mut out, &mut out_sizes)
                .await
                .unwrap();
            black_box(out.used)
        });
    });

    group.bench_function("list_keys_page_64", |b| {
        let db = MapBackend::open(&serde_json::json!({})).unwrap();
        rt.block_on(async {
            db.put(Mode::NONE, &kblob, &ksizes, &vblob, &vsizes)
                .await
                .unwrap();
        });
        let filter = Filter::new(Mode::NONE, b"").unwrap();
        b.to_async(&rt).iter(|| async {
            let mut kdata = vec![0u8; BATCH * 32];
            let mut out = OutBuf::new(&mut kdata);
            let mut out_sizes = vec![0u64; BATCH];
            db.list_keys(Mode::NONE, true, b"", &filter, &mut out, &mut out_sizes)
                .await
                .unwrap();
            black_box(out.used)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_map_put_get);
criterion_main!(benches);
