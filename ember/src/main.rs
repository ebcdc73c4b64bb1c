use clap::Parser as ClapParser;
use std::process;

use ember::{Allocator, Heap, HeapError, HeapSettings, Value};
use log::info;

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Arena size in bytes
    #[arg(long, default_value_t = HeapSettings::default().heap_size)]
    heap_size: usize,

    /// Entries of the collector's mark stack
    #[arg(long, default_value_t = HeapSettings::default().mark_stack_size)]
    mark_stack: usize,

    /// Number of workload iterations
    #[arg(long, default_value_t = 10_000)]
    iterations: usize,

    /// Keep every n-th record alive; the rest becomes garbage
    #[arg(long, default_value_t = 8)]
    keep_every: usize,

    /// Maximum number of records kept alive at once
    #[arg(long, default_value_t = 64)]
    retain: usize,

    /// Print per-type object counts at the end
    #[arg(long)]
    by_type: bool,
}

/// Builds a record `{"id": n, "name": "item-n", "tags": (n, [n, n+1]), "ratio": n/3}`.
fn make_record(heap: &mut Heap, roots: &mut Vec<Value>, n: usize) -> Result<Value, HeapError> {
    let base = roots.len();
    let record = heap.allocate_dict(roots, 4)?;
    roots.push(record);

    let key = heap.allocate_string(roots, "id")?;
    roots.push(key);
    let id = heap.allocate_int(roots, n as i64)?;
    heap.dict_put(roots, record, key, id)?;

    let key = heap.allocate_string(roots, "name")?;
    roots.push(key);
    let name = heap.allocate_string(roots, &format!("item-{n}"))?;
    heap.dict_put(roots, record, key, name)?;

    let list = heap.allocate_list(roots, &[])?;
    roots.push(list);
    heap.seq_append(roots, list, Value::small_int(n as i32 & 0xffff))?;
    heap.seq_append(roots, list, Value::small_int((n as i32 + 1) & 0xffff))?;
    let tags = heap.allocate_tuple(roots, &[id, list])?;
    roots.push(tags);
    let key = heap.allocate_string(roots, "tags")?;
    heap.dict_put(roots, record, key, tags)?;

    let ratio = heap.allocate_float(roots, n as f64 / 3.0)?;
    roots.push(ratio);
    let key = heap.allocate_string(roots, "ratio")?;
    heap.dict_put(roots, record, key, ratio)?;

    roots.truncate(base);
    Ok(record)
}

fn run(cli: &Cli) -> Result<(), HeapError> {
    let mut heap = Heap::new(HeapSettings {
        heap_size: cli.heap_size,
        mark_stack_size: cli.mark_stack,
        ..HeapSettings::default()
    })?;

    let mut roots: Vec<Value> = Vec::new();
    let keep_every = cli.keep_every.max(1);

    for n in 0..cli.iterations {
        let record = make_record(&mut heap, &mut roots, n)?;
        if cli.retain > 0 && n % keep_every == 0 {
            if roots.len() == cli.retain {
                roots.remove(0);
            }
            roots.push(record);
        }
    }

    let before = heap.stats();
    let gc = heap.collect(&mut roots);
    info!("final collection: {gc:?}");

    println!("iterations:        {}", cli.iterations);
    println!("collections:       {}", heap.collections());
    println!("live objects:      {} (before final gc: {})", heap.live_objects(), before.live_objects);
    println!("used bytes:        {} / {}", heap.used_bytes(), cli.heap_size);
    println!("largest free:      {}", heap.largest_free());
    println!("free fragments:    {}", heap.stats().free_fragments);
    if cli.by_type {
        for (name, count) in heap.stats().objects_by_type {
            println!("  {name:<12} {count}");
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        eprintln!("error: {err} ({:?})", err.exception());
        process::exit(1);
    }
}
