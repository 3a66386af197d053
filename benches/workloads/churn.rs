use criterion::{black_box, Criterion, Throughput};
use thread_slot::{Deallocator, ThreadLocal};

const OPS: usize = 10_000;

static SMALL: ThreadLocal<u64> = ThreadLocal::lazy(Deallocator::ambient());
static BUFFER: ThreadLocal<Vec<u8>> = ThreadLocal::lazy(Deallocator::ambient());

// Every set-after-clear allocates a fresh slot box, so this measures the
// allocator as much as the key.
pub fn run(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_churn");
    group.throughput(Throughput::Elements(OPS as u64));

    group.bench_function("set_clear_u64", |b| {
        b.iter(|| {
            for i in 0..OPS {
                SMALL.set(Some(black_box(i as u64)));
                SMALL.clear();
            }
        });
    });

    group.bench_function("set_clear_vec_1kb", |b| {
        b.iter(|| {
            for _ in 0..OPS {
                BUFFER.set(Some(Vec::with_capacity(1024)));
                BUFFER.clear();
            }
        });
    });

    group.finish();
}
