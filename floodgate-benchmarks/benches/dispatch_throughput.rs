//! Dispatch Throughput Benchmark
//!
//! Measures the per-request cost of a full pipeline walk: admission,
//! context arming, per-stage cell locking, and terminal teardown. Variants
//! cover pipeline depth, blocked/resumed flows, and buffer-carrying stages.
//!
//! # Running
//!
//! ```bash
//! cargo bench --package floodgate-benchmarks --bench dispatch_throughput
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use floodgate_engine::{
    Assignment, Engine, EngineConfig, RequestSeed, StageId, StageOutcome,
};
use std::time::Duration;

fn bench_config() -> EngineConfig {
    EngineConfig {
        max_active_threads: 1,
        // No background noise during measurement.
        sweep_interval: Duration::ZERO,
        dataset_count: 16,
        dataset_assignment: Assignment::Static,
        admission_timeout: None,
    }
}

/// Builds an engine whose pipeline is `depth` pass-through stages.
fn linear_engine(depth: u16) -> Engine<u64> {
    let mut builder = Engine::builder(bench_config());
    for stage in 0..depth {
        let next = stage + 1;
        builder = builder.stage(StageId(stage), move |_scope| {
            if next < depth {
                Ok(StageOutcome::Continue(StageId(next)))
            } else {
                Ok(StageOutcome::Done)
            }
        });
    }
    builder.build().unwrap()
}

fn bench_pipeline_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_depth");
    group.throughput(Throughput::Elements(1));

    for depth in [1u16, 2, 4, 8, 16] {
        let engine = linear_engine(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            let mut key = 0u64;
            b.iter(|| {
                key = key.wrapping_add(1);
                let outcome = engine
                    .submit(RequestSeed::new(black_box(key), key), StageId(0))
                    .unwrap();
                black_box(outcome.primary.is_done())
            });
        });
    }
    group.finish();
}

fn bench_park_resume_cycle(c: &mut Criterion) {
    // Every request blocks once and is resumed once: two admissions, one
    // context save/restore.
    let engine: Engine<bool> = Engine::builder(bench_config())
        .stage(StageId(0), |scope| {
            if *scope.payload() {
                Ok(StageOutcome::Done)
            } else {
                *scope.payload_mut() = true;
                Ok(StageOutcome::Blocked)
            }
        })
        .build()
        .unwrap();

    c.bench_function("park_resume_cycle", |b| {
        let mut key = 0u64;
        b.iter(|| {
            key = key.wrapping_add(1);
            let parked = engine
                .submit(RequestSeed::new(key, false), StageId(0))
                .unwrap()
                .primary
                .into_parked()
                .unwrap();
            let outcome = engine.resume(parked);
            black_box(outcome.primary.is_done())
        });
    });
}

fn bench_buffer_carrying_walk(c: &mut Criterion) {
    // One stage fills a buffer, the next reads it back through the chain.
    let engine: Engine<u64> = Engine::builder(bench_config())
        .stage(StageId(0), |scope| {
            let mut buf = scope.arena().acquire(256)?;
            buf.fill(&scope.key().to_le_bytes())?;
            scope.chain_mut().push_back(buf)?;
            Ok(StageOutcome::Continue(StageId(1)))
        })
        .stage(StageId(1), |scope| {
            let total: usize = scope.chain().iter().map(<[u8]>::len).sum();
            *scope.payload_mut() = total as u64;
            Ok(StageOutcome::Done)
        })
        .build()
        .unwrap();

    let mut group = c.benchmark_group("buffer_walk");
    group.throughput(Throughput::Elements(1));
    group.bench_function("fill_and_read", |b| {
        let mut key = 0u64;
        b.iter(|| {
            key = key.wrapping_add(1);
            let outcome = engine.submit(RequestSeed::new(key, 0), StageId(0)).unwrap();
            black_box(outcome.primary.is_done())
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_pipeline_depth,
    bench_park_resume_cycle,
    bench_buffer_carrying_walk
);
criterion_main!(benches);
