use criterion::{black_box, Criterion, Throughput};
use std::thread;
use thread_slot::{Deallocator, ThreadLocal};

const OPS_PER_THREAD: usize = 20_000;

static COUNTER: ThreadLocal<u64> = ThreadLocal::lazy(Deallocator::ambient());

// Threads hammer one shared cell; each touches only its own slot, so this
// should scale with the thread count.
pub fn run(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared_cell");

    for t in [1, 2, 4, 8, 16] {
        group.throughput(Throughput::Elements((OPS_PER_THREAD * t) as u64));
        group.bench_function(format!("increment_{t}_threads"), |b| {
            b.iter(|| {
                thread::scope(|s| {
                    for _ in 0..t {
                        s.spawn(|| {
                            for _ in 0..OPS_PER_THREAD {
                                let v = COUNTER.get_or_init(|| 0);
                                COUNTER.set(Some(v + 1));
                            }
                            black_box(COUNTER.get());
                        });
                    }
                });
            });
        });
    }

    group.finish();
}
