use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use hubsync_core::{MessageHash, SyncId};
use hubsync_sync::{MerkleTrie, Snapshot};

fn ids(count: u32) -> Vec<SyncId> {
    (0..count)
        .map(|i| {
            let hash = MessageHash::hash(&i.to_be_bytes());
            SyncId::new(1_000 + i * 7, &hash)
        })
        .collect()
}

fn bench_insert(c: &mut Criterion) {
    let ids = ids(10_000);
    c.bench_function("trie_insert_10k", |b| {
        b.iter_batched(
            MerkleTrie::new,
            |mut trie| {
                for id in &ids {
                    trie.insert(id).unwrap();
                }
                trie
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_diff(c: &mut Criterion) {
    let ids = ids(10_000);
    let mut full = MerkleTrie::new();
    let mut partial = MerkleTrie::new();
    for (i, id) in ids.iter().enumerate() {
        full.insert(id).unwrap();
        if i % 100 != 0 {
            partial.insert(id).unwrap();
        }
    }
    c.bench_function("trie_diff_1pct", |b| b.iter(|| black_box(partial.diff(&full))));
}

fn bench_snapshot(c: &mut Criterion) {
    let mut trie = MerkleTrie::new();
    for id in ids(10_000) {
        trie.insert(&id).unwrap();
    }
    c.bench_function("snapshot_compute", |b| {
        b.iter(|| black_box(Snapshot::compute(&trie, 50_000)))
    });
}

criterion_group!(benches, bench_insert, bench_diff, bench_snapshot);
criterion_main!(benches);
