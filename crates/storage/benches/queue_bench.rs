//! Benchmarks for ring queue and fan-in hot paths.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use splitd_storage::{RingQueue, TagFanIn};

fn bench_push_pop_single(c: &mut Criterion) {
    let queue = RingQueue::new(1024);
    let mut out = Vec::with_capacity(1);

    c.bench_function("push_pop_single", |b| {
        b.iter(|| {
            queue.push([black_box(42u64)]).unwrap();
            out.clear();
            queue.pop(1, &mut out).unwrap();
        })
    });
}

fn bench_push_batch_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_batch");

    for size in [1usize, 16, 128, 1024].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let queue = RingQueue::new(size);
            b.iter(|| {
                queue.push(0..black_box(size)).unwrap();
                black_box(queue.drain())
            })
        });
    }

    group.finish();
}

fn bench_fan_in_push_and_clear(c: &mut Criterion) {
    let fan_in: TagFanIn<String, u64> = TagFanIn::new(4096);
    let tags: Vec<String> = (0..16).map(|i| format!("client-{i}/go-1.0")).collect();

    c.bench_function("fan_in_push_16_tags_then_clear", |b| {
        b.iter(|| {
            for tag in &tags {
                fan_in.push(tag, vec![1, 2, 3]).unwrap();
            }
            black_box(fan_in.drain_all())
        })
    });
}

criterion_group!(
    benches,
    bench_push_pop_single,
    bench_push_batch_sizes,
    bench_fan_in_push_and_clear
);
criterion_main!(benches);
