use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use lrumap::LruMap;

fn bench_cached_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_get");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_hit", |b| {
        let map = LruMap::new(1000).unwrap();
        let data = vec![b'x'; 1024];

        // Pre-populate
        for key in 0..100u64 {
            map.put(key, data.clone());
        }

        let mut counter = 0u64;
        b.iter(|| {
            black_box(map.get(&(counter % 100)));
            counter += 1;
        });
    });

    group.bench_function("peek_hit", |b| {
        let map = LruMap::new(1000).unwrap();
        for key in 0..100u64 {
            map.put(key, key);
        }

        let mut counter = 0u64;
        b.iter(|| {
            black_box(map.peek(&(counter % 100)));
            counter += 1;
        });
    });

    group.finish();
}

fn bench_mixed_50_50(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("50_read_50_write", |b| {
        let map = LruMap::new(1000).unwrap();
        for key in 0..100u64 {
            map.put(key, key);
        }

        let mut counter = 0u64;
        b.iter(|| {
            if counter.is_multiple_of(2) {
                black_box(map.get(&(counter % 100)));
            } else {
                black_box(map.put(counter % 2000, counter));
            }
            counter += 1;
        });
    });

    group.finish();
}

fn bench_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("put_always_evicts", |b| {
        let map = LruMap::new(10).unwrap(); // Small cache

        let mut counter = 0u64;
        b.iter(|| {
            // Every key is fresh, so every put past warm-up evicts
            black_box(map.put(counter, counter));
            counter += 1;
        });
    });

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended");
    group.sample_size(20);

    for threads in [2usize, 4, 8] {
        group.throughput(Throughput::Elements((threads * 1000) as u64));
        group.bench_function(format!("get_put_{}_threads", threads), |b| {
            let map: Arc<LruMap<u64, u64>> = Arc::new(LruMap::new(512).unwrap());

            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|tid| {
                        let map = Arc::clone(&map);
                        thread::spawn(move || {
                            for i in 0..1000u64 {
                                let key = (i * 7 + tid as u64) % 1024;
                                if i % 4 == 0 {
                                    map.put(key, i);
                                } else {
                                    black_box(map.get(&key));
                                }
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cached_get,
    bench_mixed_50_50,
    bench_eviction,
    bench_contended
);
criterion_main!(benches);
