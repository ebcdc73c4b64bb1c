use std::thread;

use ember::{
    Allocator, Heap, HeapError, HeapSettings, NoRoots, RootProvider, SharedHeap,
    TypeTag, Value,
};

/// Roots held by a test "interpreter": a value stack plus globals.
#[derive(Default)]
struct TestRoots {
    stack: Vec<Value>,
    globals: Vec<Value>,
}

impl RootProvider for TestRoots {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(Value)) {
        for &value in self.stack.iter().chain(&self.globals) {
            visitor(value);
        }
    }
}

fn create_heap(heap_size: usize) -> Heap {
    Heap::new(HeapSettings {
        heap_size,
        ..HeapSettings::default()
    })
    .unwrap()
}

fn int(n: i32) -> Value {
    Value::small_int(n)
}

#[test]
fn dropped_list_is_reclaimed_while_tuple_survives() {
    let mut heap = create_heap(1024);
    let mut roots = TestRoots::default();

    let tuple = heap.allocate_tuple(&mut roots, &[int(4), int(5)]).unwrap();
    roots.stack.push(tuple);
    let list = heap
        .allocate_list(&mut roots, &[int(1), int(2), int(3)])
        .unwrap();
    let list_size = heap.header(list.heap_ref().unwrap()).size();
    let free_before = heap.free_bytes();

    let stats = heap.collect(&mut roots);

    assert_eq!(stats.freed_objects, 1);
    assert_eq!(stats.freed_bytes, list_size);
    assert!(!heap.contains(list));
    assert_eq!(heap.free_bytes(), free_before + list_size);
    assert_eq!(heap.type_of(tuple), TypeTag::Tuple);
    assert_eq!(heap.objects(tuple).unwrap(), &[int(4), int(5)]);
}

#[test]
fn dict_survives_delete_and_rehash() {
    let mut heap = create_heap(16 * 1024);
    let mut roots = TestRoots::default();

    let dict = heap.allocate_dict(&mut roots, 0).unwrap();
    roots.globals.push(dict);
    let a = heap.allocate_string(&mut roots, "a").unwrap();
    roots.stack.push(a);
    let b = heap.allocate_string(&mut roots, "b").unwrap();
    roots.stack.push(b);

    heap.dict_put(&mut roots, dict, a, int(1)).unwrap();
    heap.dict_put(&mut roots, dict, b, int(2)).unwrap();
    assert_eq!(heap.dict_del(dict, a).unwrap(), int(1));

    let lookup_a = heap.allocate_string(&mut roots, "a").unwrap();
    roots.stack.push(lookup_a);
    assert_eq!(heap.dict_get(dict, lookup_a).unwrap(), None);
    assert_eq!(heap.dict_get(dict, b).unwrap(), Some(int(2)));

    let capacity = heap.capacity(dict).unwrap();
    let mut n = 0;
    while heap.capacity(dict).unwrap() == capacity {
        heap.dict_put(&mut roots, dict, int(n), int(-n)).unwrap();
        n += 1;
    }
    assert!(heap.capacity(dict).unwrap() > capacity);

    heap.collect(&mut roots);
    let lookup_b = heap.allocate_string(&mut roots, "b").unwrap();
    assert_eq!(heap.dict_get(dict, lookup_b).unwrap(), Some(int(2)));
    for k in 0..n {
        assert_eq!(heap.dict_get(dict, int(k)).unwrap(), Some(int(-k)));
    }
}

#[test]
fn reachable_set_survives_and_unreachable_set_is_reclaimed() {
    let mut heap = create_heap(8 * 1024);
    let mut roots = TestRoots::default();

    // reachable: root list -> dict -> (string, float), root list -> tuple
    let root = heap.allocate_list(&mut roots, &[]).unwrap();
    roots.globals.push(root);
    let dict = heap.allocate_dict(&mut roots, 0).unwrap();
    heap.seq_append(&mut roots, root, dict).unwrap();
    let key = heap.allocate_string(&mut roots, "pi").unwrap();
    roots.stack.push(key);
    let pi = heap.allocate_float(&mut roots, 3.25).unwrap();
    heap.dict_put(&mut roots, dict, key, pi).unwrap();
    roots.stack.clear();
    let tuple = heap.allocate_tuple(&mut roots, &[int(7), dict]).unwrap();
    heap.seq_append(&mut roots, root, tuple).unwrap();

    let reachable_bytes = heap.used_bytes();
    let reachable = heap.live_objects();

    // unreachable: a two-list cycle and a chain hanging off it
    let x = heap.allocate_list(&mut roots, &[]).unwrap();
    roots.stack.push(x);
    let y = heap.allocate_list(&mut roots, &[x]).unwrap();
    heap.seq_append(&mut roots, x, y).unwrap();
    let tail = heap.allocate_bytes(&mut roots, b"garbage").unwrap();
    heap.seq_append(&mut roots, y, tail).unwrap();
    roots.stack.clear();

    let stats = heap.collect(&mut roots);
    assert_eq!(stats.freed_objects, 3);
    assert_eq!(heap.live_objects(), reachable);
    assert_eq!(heap.used_bytes(), reachable_bytes);
    for value in [x, y, tail] {
        assert!(!heap.contains(value));
    }

    let pi_key = heap.allocate_string(&mut roots, "pi").unwrap();
    let found = heap.dict_get(dict, pi_key).unwrap().unwrap();
    assert_eq!(heap.float_value(found).unwrap(), 3.25);
    assert_eq!(heap.objects(tuple).unwrap(), &[int(7), dict]);
    assert_eq!(heap.objects(root).unwrap(), &[dict, tuple]);
}

#[test]
fn second_collection_frees_nothing() {
    let mut heap = create_heap(4096);
    let mut roots = TestRoots::default();
    let keep = heap.allocate_list(&mut roots, &[int(1)]).unwrap();
    roots.globals.push(keep);
    for n in 0..10 {
        heap.allocate_int(&mut roots, (1 << 40) + n).unwrap();
    }

    let first = heap.collect(&mut roots);
    let after_first = heap.stats();
    let second = heap.collect(&mut roots);
    let after_second = heap.stats();

    assert_eq!(first.freed_objects, 10);
    assert_eq!(second.freed_objects, 0);
    assert_eq!(second.marked, first.marked);
    assert_eq!(after_first.live_objects, after_second.live_objects);
    assert_eq!(after_first.free_bytes, after_second.free_bytes);
    assert_eq!(after_first.objects_by_type, after_second.objects_by_type);
    assert_eq!(heap.objects(keep).unwrap(), &[int(1)]);
}

#[test]
fn exact_fit_succeeds_and_oversize_fails() {
    let mut heap = create_heap(512);
    let mut roots = TestRoots::default();
    let live = heap.allocate_tuple(&mut roots, &[int(1)]).unwrap();
    roots.globals.push(live);
    heap.allocate_bytes(&mut roots, &[0; 40]).unwrap();
    heap.collect(&mut roots);

    // a bytes block is 8 header + 8 length fields + data, rounded to 8
    let free = heap.largest_free();
    assert_eq!(free, heap.free_bytes());
    let err = heap
        .allocate_bytes(&mut roots, &vec![1; free - 16 + 1])
        .unwrap_err();
    assert!(matches!(err, HeapError::OutOfMemory { requested, .. } if requested == free + 8));
    assert_eq!(heap.free_bytes(), free);
    assert_eq!(heap.objects(live).unwrap(), &[int(1)]);

    let exact = heap.allocate_bytes(&mut roots, &vec![1; free - 16]).unwrap();
    assert_eq!(heap.free_bytes(), 0);
    assert_eq!(heap.len(exact).unwrap(), free - 16);
}

fn is_out_of_memory<T>(result: Result<T, HeapError>) -> bool {
    matches!(result, Err(HeapError::OutOfMemory { .. }))
}

#[test]
fn requests_larger_than_the_arena_fail_cleanly() {
    let mut heap = create_heap(1024);
    let mut roots = TestRoots::default();
    let list = heap.allocate_list(&mut roots, &[int(1)]).unwrap();
    roots.globals.push(list);
    let dict = heap.allocate_dict(&mut roots, 0).unwrap();
    roots.globals.push(dict);
    let before = heap.stats();

    for kind in [
        TypeTag::Bytes,
        TypeTag::ByteArray,
        TypeTag::Shorts,
        TypeTag::ShortArray,
        TypeTag::Tuple,
        TypeTag::List,
    ] {
        assert!(is_out_of_memory(heap.allocate_sequence(&mut roots, kind, usize::MAX / 4)));
        assert!(is_out_of_memory(heap.allocate_sequence(&mut roots, kind, 1024)));
    }
    assert!(is_out_of_memory(heap.allocate_sysobj(&mut roots, usize::MAX)));
    assert!(is_out_of_memory(heap.allocate_sysobj(&mut roots, 2048)));
    assert!(is_out_of_memory(heap.allocate_buffer(&mut roots, usize::MAX / 2)));
    assert!(is_out_of_memory(heap.allocate_frame(
        &mut roots,
        Value::NONE,
        Value::NONE,
        Value::NONE,
        usize::MAX / 16,
        1,
    )));
    assert!(is_out_of_memory(heap.allocate_frame(
        &mut roots,
        Value::NONE,
        Value::NONE,
        Value::NONE,
        8,
        usize::MAX,
    )));
    assert!(is_out_of_memory(heap.allocate_dict(&mut roots, usize::MAX / 2)));
    assert!(is_out_of_memory(heap.allocate_dict(&mut roots, 4096)));
    assert!(is_out_of_memory(heap.allocate_set(&mut roots, TypeTag::Set, usize::MAX)));
    assert!(is_out_of_memory(heap.allocate_set(&mut roots, TypeTag::FrozenSet, 1000)));
    assert!(is_out_of_memory(heap.seq_reserve(&mut roots, list, usize::MAX / 4)));
    assert!(is_out_of_memory(heap.seq_reserve(&mut roots, list, 1 << 16)));

    // nothing was built, collected or resized
    assert_eq!(heap.stats(), before);
    assert_eq!(heap.objects(list).unwrap(), &[int(1)]);
    assert_eq!(heap.capacity(list).unwrap(), 1);
    assert_eq!(heap.len(dict).unwrap(), 0);

    let err = heap.allocate_sequence(&mut roots, TypeTag::Tuple, usize::MAX).unwrap_err();
    assert_eq!(err.exception(), ember::ExceptionKind::MemoryError);
    let small = heap.allocate_sequence(&mut roots, TypeTag::Tuple, 4).unwrap();
    assert_eq!(heap.len(small).unwrap(), 4);
}

#[test]
fn allocation_failure_after_collection_is_recoverable() {
    let mut heap = create_heap(256);
    let mut roots = TestRoots::default();
    let list = heap.allocate_list(&mut roots, &[]).unwrap();
    roots.globals.push(list);

    let err = loop {
        match heap.seq_append(&mut roots, list, int(1)) {
            Ok(()) => continue,
            Err(err) => break err,
        }
    };
    assert_eq!(err.exception(), ember::ExceptionKind::MemoryError);
    let len = heap.len(list).unwrap();
    assert!(len > 0);
    assert!(heap.objects(list).unwrap().iter().all(|&v| v == int(1)));

    // space is still usable for small objects
    roots.globals.clear();
    heap.collect(&mut roots);
    assert_eq!(heap.free_bytes(), 256);
}

#[test]
fn growth_keeps_insertion_order() {
    let mut heap = create_heap(64 * 1024);
    let mut roots = TestRoots::default();
    let list = heap.allocate_list(&mut roots, &[]).unwrap();
    roots.globals.push(list);
    let bytes = heap.allocate_bytearray(&mut roots, &[]).unwrap();
    roots.globals.push(bytes);

    for n in 0..500 {
        heap.seq_append(&mut roots, list, int(n)).unwrap();
        heap.seq_append(&mut roots, bytes, int(n % 256)).unwrap();
        // garbage between appends forces collections during growth
        heap.allocate_string(&mut roots, "noise").unwrap();
    }

    let expected: Vec<Value> = (0..500).map(int).collect();
    assert_eq!(heap.objects(list).unwrap(), expected.as_slice());
    let expected: Vec<u8> = (0..500).map(|n| (n % 256) as u8).collect();
    assert_eq!(heap.bytes(bytes).unwrap(), expected.as_slice());
}

#[test]
fn deep_and_wide_graphs_overflow_mark_stack() {
    let mut heap = Heap::new(HeapSettings {
        heap_size: 64 * 1024,
        mark_stack_size: 1,
        ..HeapSettings::default()
    })
    .unwrap();
    let mut roots = TestRoots::default();

    let mut chain = Value::NONE;
    for n in 0..100 {
        let wide = heap
            .allocate_tuple(&mut roots, &[chain, Value::NONE])
            .unwrap();
        roots.stack.push(wide);
        let leaf = heap.allocate_float(&mut roots, n as f64).unwrap();
        chain = heap.allocate_tuple(&mut roots, &[wide, leaf]).unwrap();
        roots.stack.clear();
        roots.stack.push(chain);
    }
    roots.stack.clear();
    roots.globals.push(chain);
    for _ in 0..50 {
        heap.allocate_list(&mut roots, &[]).unwrap();
    }

    let stats = heap.collect(&mut roots);
    assert!(stats.rescans > 0);
    assert_eq!(stats.freed_objects, 50);
    assert_eq!(heap.live_objects(), 300);
}

#[test]
fn pinned_globals_survive_without_roots() {
    let mut heap = create_heap(1024);
    let global = heap.allocate_dict(&mut NoRoots, 0).unwrap();
    heap.pin(global);
    let value = heap.allocate_string(&mut NoRoots, "kept").unwrap();
    heap.dict_put(&mut NoRoots, global, int(0), value).unwrap();

    heap.collect(&mut NoRoots);
    assert!(heap.contains(global));
    assert_eq!(heap.str_value(value).unwrap(), "kept");

    heap.unpin(global);
    heap.collect(&mut NoRoots);
    assert_eq!(heap.live_objects(), 0);
}

#[test]
fn collection_is_never_triggered_by_reads() {
    let mut heap = create_heap(1024);
    let list = heap.allocate_list(&mut NoRoots, &[int(1)]).unwrap();
    for _ in 0..100 {
        heap.seq_get(list, 0).unwrap();
        heap.len(list).unwrap();
        heap.type_of(list);
    }
    assert_eq!(heap.collections(), 0);
    assert!(heap.contains(list));
}

#[test]
fn threads_share_the_heap_under_one_lock() {
    let shared = SharedHeap::new(HeapSettings {
        heap_size: 16 * 1024,
        ..HeapSettings::default()
    })
    .unwrap();
    let global = shared.with(|heap| {
        let list = heap.allocate_list(&mut NoRoots, &[]).unwrap();
        heap.pin(list);
        list
    });

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let shared = shared.clone();
            thread::spawn(move || {
                for n in 0..50 {
                    shared
                        .with(|heap| {
                            heap.allocate_bytes(&mut NoRoots, &[0; 64])?;
                            let v = heap.allocate_int(&mut NoRoots, (1 << 40) + t * 100 + n)?;
                            heap.seq_append(&mut NoRoots, global, v)
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let heap = shared.lock();
    assert!(heap.collections() > 0);
    let items = heap.objects(global).unwrap();
    assert_eq!(items.len(), 200);
    let mut values: Vec<i64> = items.iter().map(|&v| heap.int_value(v).unwrap()).collect();
    values.sort();
    let mut expected: Vec<i64> = (0..4)
        .flat_map(|t| (0..50).map(move |n| (1 << 40) + t * 100 + n))
        .collect();
    expected.sort();
    assert_eq!(values, expected);
}
