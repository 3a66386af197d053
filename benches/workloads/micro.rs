use criterion::{black_box, Criterion};
use std::cell::Cell;
use thread_slot::{Deallocator, ThreadLocal};

static CELL: ThreadLocal<u64> = ThreadLocal::lazy(Deallocator::ambient());

thread_local! {
    static STD_CELL: Cell<u64> = const { Cell::new(0) };
}

pub fn run(c: &mut Criterion) {
    bench_get(c);
    bench_set(c);
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro_get");

    CELL.set(Some(1));
    group.bench_function("thread_slot_get", |b| {
        b.iter(|| black_box(CELL.get()));
    });

    group.bench_function("thread_slot_get_or_init", |b| {
        b.iter(|| black_box(CELL.get_or_init(|| 0)));
    });

    group.bench_function("std_thread_local_get", |b| {
        b.iter(|| black_box(STD_CELL.get()));
    });

    group.finish();
}

fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro_set");

    CELL.set(Some(1));
    group.bench_function("thread_slot_replace", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i = i.wrapping_add(1);
            CELL.set(Some(black_box(i)));
        });
    });

    group.bench_function("thread_slot_with_mut", |b| {
        b.iter(|| CELL.with_mut(|v| *v.unwrap() += black_box(1)));
    });

    group.bench_function("std_thread_local_set", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i = i.wrapping_add(1);
            STD_CELL.set(black_box(i));
        });
    });

    group.finish();
}
