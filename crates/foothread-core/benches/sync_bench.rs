//! Primitive and lifecycle benchmarks.

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use foothread_core::sem::Semaphore;
use foothread_core::{Attributes, Barrier, Mutex, Runtime};

fn bench_mutex_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutex");
    let mutex = Mutex::new();
    mutex.init().unwrap();

    group.bench_function("lock_unlock", |b| {
        b.iter(|| {
            mutex.lock().unwrap();
            mutex.unlock().unwrap();
        });
    });
    group.finish();
    mutex.destroy().unwrap();
}

fn bench_semaphore(c: &mut Criterion) {
    let mut group = c.benchmark_group("semaphore");
    let sem = Semaphore::new(0);

    group.bench_function("signal_wait", |b| {
        b.iter(|| {
            sem.signal().unwrap();
            sem.wait().unwrap();
        });
    });
    group.bench_function("try_wait_empty", |b| {
        b.iter(|| criterion::black_box(sem.try_wait()));
    });
    group.finish();
}

fn bench_create_exit(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_exit");
    group.sample_size(20);

    for &children in &[1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("joinable_children", children),
            &children,
            |b, &k| {
                let runtime = Arc::new(Runtime::default());
                b.iter(|| {
                    for _ in 0..k {
                        let rt = Arc::clone(&runtime);
                        runtime
                            .create(Some(Attributes::joinable()), move |_: ()| rt.exit(), ())
                            .unwrap();
                    }
                    runtime.exit();
                });
            },
        );
    }
    group.finish();
}

fn bench_barrier_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("barrier");

    group.bench_function("init_wait_destroy_single", |b| {
        let barrier = Barrier::new();
        b.iter(|| {
            barrier.init(1).unwrap();
            criterion::black_box(barrier.wait().unwrap());
            barrier.destroy().unwrap();
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_mutex_uncontended,
    bench_semaphore,
    bench_create_exit,
    bench_barrier_release
);
criterion_main!(benches);
