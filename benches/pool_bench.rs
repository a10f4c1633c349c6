//! Benchmarks for executors and the state machine.
//!
//! Benchmarks cover:
//! - Submission-to-completion latency on the bounded pool
//! - Throughput through the sequential wrapper
//! - Bulk state machine moves and snapshots

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use workstage::config::WorkerPoolConfig;
use workstage::core::{
    BoundedWorkerPool, Executor, HandlerRegistration, InlineExecutor, SequentialExecutor, StateController,
    StateMachine, Task, WorkerPool,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Stage {
    Loaded,
    Indexed,
}

// ============================================================================
// Worker Pool Benchmarks
// ============================================================================

fn bench_pool_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_round_trip");

    for workers in [1usize, 4] {
        let pool = BoundedWorkerPool::new(WorkerPoolConfig::new().with_worker_count(workers)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, _| {
            b.iter(|| {
                let (tx, rx) = crossbeam_channel::bounded(1);
                pool.execute(Task::from_fn(move || {
                    let _ = tx.send(());
                }))
                .unwrap();
                rx.recv().unwrap();
            });
        });
        pool.shutdown();
        pool.await_termination(Duration::from_secs(5));
    }

    group.finish();
}

fn bench_pool_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_burst");

    for task_count in [100u64, 1_000] {
        let pool = BoundedWorkerPool::new(WorkerPoolConfig::new().with_worker_count(4)).unwrap();
        group.throughput(Throughput::Elements(task_count));
        group.bench_with_input(BenchmarkId::from_parameter(task_count), &task_count, |b, &task_count| {
            b.iter(|| {
                let (tx, rx) = crossbeam_channel::unbounded();
                for i in 0..task_count {
                    let tx = tx.clone();
                    pool.execute(Task::from_fn(move || {
                        let _ = tx.send(black_box(i));
                    }))
                    .unwrap();
                }
                drop(tx);
                black_box(rx.iter().count());
            });
        });
        pool.shutdown();
        pool.await_termination(Duration::from_secs(5));
    }

    group.finish();
}

fn bench_sequential_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_throughput");
    let pool = Arc::new(BoundedWorkerPool::new(WorkerPoolConfig::new().with_worker_count(4)).unwrap());
    let serial = SequentialExecutor::new(Arc::clone(&pool));

    group.throughput(Throughput::Elements(1_000));
    group.bench_function("1000_tasks", |b| {
        b.iter(|| {
            let (tx, rx) = crossbeam_channel::unbounded();
            for i in 0..1_000u64 {
                let tx = tx.clone();
                serial
                    .execute(Task::from_fn(move || {
                        let _ = tx.send(i);
                    }))
                    .unwrap();
            }
            drop(tx);
            black_box(rx.iter().count());
        });
    });

    pool.shutdown();
    pool.await_termination(Duration::from_secs(5));
    group.finish();
}

// ============================================================================
// State Machine Benchmarks
// ============================================================================

fn bench_state_machine_moves(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_machine_moves");

    for size in [1_000u32, 25_000] {
        group.throughput(Throughput::Elements(u64::from(size)));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let machine = StateMachine::new([Stage::Loaded, Stage::Indexed]);
            machine
                .register_state_change_handler(HandlerRegistration::from_fn(
                    [Stage::Loaded],
                    |objects: Vec<u32>, _, ctl: &StateController<Stage, u32>| {
                        ctl.change_state(objects, Stage::Indexed)?;
                        Ok(())
                    },
                    Arc::new(InlineExecutor),
                ))
                .unwrap();
            b.iter(|| {
                machine.reset_state(0..size, Stage::Loaded).unwrap();
                machine.notify_handlers(Stage::Loaded).unwrap();
                black_box(machine.count_in_state(Stage::Indexed));
            });
        });
    }

    group.finish();
}

fn bench_state_machine_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_machine_snapshot");

    for size in [1_000u32, 25_000] {
        let machine: StateMachine<Stage, u32> = StateMachine::new([Stage::Loaded, Stage::Indexed]);
        machine.reset_state(0..size, Stage::Loaded).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(machine.get_objects_in_state(Stage::Loaded).len()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_pool_round_trip,
    bench_pool_burst,
    bench_sequential_throughput,
    bench_state_machine_moves,
    bench_state_machine_snapshot
);
criterion_main!(benches);
