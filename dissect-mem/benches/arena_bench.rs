#[macro_use]
extern crate criterion;

use criterion::{BatchSize, Criterion, Throughput};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use dissect_mem::collections::{Map, SplayTree};
use dissect_mem::{Allocator, AllocatorKind};

const FIELDS_PER_PACKET: usize = 64;

fn bench_packet_allocations(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_allocations");
    group.throughput(criterion::Throughput::Elements(FIELDS_PER_PACKET as u64));

    for kind in AllocatorKind::ALL {
        group.bench_function(kind.as_str(), |b| {
            let allocator = Allocator::named(kind, "bench");
            let mut rng = SmallRng::seed_from_u64(7);
            let sizes: Vec<usize> = (0..FIELDS_PER_PACKET)
                .map(|_| rng.random_range(8..256))
                .collect();
            b.iter(|| {
                for &size in &sizes {
                    criterion::black_box(allocator.alloc(size));
                }
                allocator.free_all();
            });
        });
    }
    group.finish();
}

fn bench_map_insert_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_insert_lookup");

    for count in [64u32, 1024, 16384] {
        group.throughput(Throughput::Elements(u64::from(count)));
        group.bench_function(format!("entries_{count}"), |b| {
            let allocator = Allocator::new(AllocatorKind::Block);
            b.iter_batched(
                || Map::<u32, u32>::new(&allocator),
                |mut map| {
                    for key in 0..count {
                        map.insert(key, key);
                    }
                    for key in 0..count {
                        criterion::black_box(map.get(&key));
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_splay_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("splay_lookup");
    let allocator = Allocator::new(AllocatorKind::Block);
    let mut tree = SplayTree::new(&allocator);
    for key in 0u32..4096 {
        tree.insert(key, key);
    }
    let mut rng = SmallRng::seed_from_u64(11);
    let probes: Vec<u32> = (0..1024).map(|_| rng.random_range(0..4096)).collect();

    group.throughput(Throughput::Elements(probes.len() as u64));
    group.bench_function("random_probes", |b| {
        b.iter(|| {
            for probe in &probes {
                criterion::black_box(tree.get(probe));
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_packet_allocations,
    bench_map_insert_lookup,
    bench_splay_lookup
);
criterion_main!(benches);
