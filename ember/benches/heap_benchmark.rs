//! Allocation and collection throughput.
//!
//!   cargo bench --bench heap_benchmark

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ember::{Allocator, Heap, HeapSettings, Value};

fn create_heap(heap_size: usize) -> Heap {
    Heap::new(HeapSettings {
        heap_size,
        ..HeapSettings::default()
    })
    .expect("Invalid heap settings")
}

/// Benchmark 1: Short-lived garbage
/// Every allocation is dropped at once, so collections find almost nothing live.
fn bench_allocation_churn(c: &mut Criterion) {
    let mut heap = create_heap(64 * 1024);
    let mut roots: Vec<Value> = Vec::new();

    c.bench_function("allocation_churn_1000", |b| {
        b.iter(|| {
            for n in 0..1000 {
                let list = heap
                    .allocate_list(&mut roots, &[Value::small_int(n)])
                    .expect("Benchmark failed");
                black_box(list);
            }
        });
    });
}

/// Benchmark 2: Full collection over a rooted tree
/// Marks 1000 tuples and sweeps 1000 dead lists per iteration.
fn bench_collect(c: &mut Criterion) {
    let mut heap = create_heap(256 * 1024);
    let mut roots: Vec<Value> = Vec::new();
    let mut previous = Value::NONE;
    for n in 0..1000 {
        previous = heap
            .allocate_tuple(&mut roots, &[previous, Value::small_int(n)])
            .expect("Setup failed");
        roots.clear();
        roots.push(previous);
    }

    c.bench_function("collect_1000_live", |b| {
        b.iter(|| {
            for n in 0..1000 {
                heap.allocate_list(&mut roots, &[Value::small_int(n)])
                    .expect("Benchmark failed");
            }
            black_box(heap.collect(&mut roots));
        });
    });
}

/// Benchmark 3: Dictionary growth
/// String keys force hashing by content and several rehashes per run.
fn bench_dict_put(c: &mut Criterion) {
    let mut heap = create_heap(256 * 1024);
    let keys: Vec<String> = (0..256).map(|n| format!("key-{n}")).collect();

    c.bench_function("dict_put_256", |b| {
        b.iter(|| {
            let mut roots: Vec<Value> = Vec::new();
            let dict = heap.allocate_dict(&mut roots, 0).expect("Benchmark failed");
            roots.push(dict);
            for (n, key) in keys.iter().enumerate() {
                let key = heap.allocate_string(&mut roots, key).expect("Benchmark failed");
                heap.dict_put(&mut roots, dict, key, Value::small_int(n as i32))
                    .expect("Benchmark failed");
            }
            black_box(heap.len(dict).expect("Benchmark failed"));
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_allocation_churn, bench_collect, bench_dict_put
}

criterion_main!(benches);
