//! Performance benchmarks for memory create/get operations.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use memnesis::storage::queries;
use memnesis::storage::{ScanFilters, Storage};
use memnesis::types::{new_memory_id, Memory, MemoryStatus, MemoryType};
use serde_json::json;

fn sample_memory(i: usize) -> Memory {
    Memory {
        id: new_memory_id(),
        content: format!("Memory content number {i} for benchmarking"),
        memory_type: MemoryType::Note,
        project: Some("bench".to_string()),
        source_role: None,
        importance: 0.5,
        created_at: chrono::Utc::now(),
        accessed_at: chrono::Utc::now(),
        access_count: 0,
        surface_count: 0,
        validated: false,
        status: MemoryStatus::Active,
        metadata: json!({}),
    }
}

fn bench_memory_insert(c: &mut Criterion) {
    let storage = Storage::open_in_memory().unwrap();
    let mut group = c.benchmark_group("memory_insert");
    group.throughput(Throughput::Elements(1));

    let mut i = 0;
    group.bench_function("insert", |b| {
        b.iter(|| {
            i += 1;
            storage.with_connection(|conn| queries::insert(conn, black_box(&sample_memory(i)))).unwrap()
        })
    });
    group.finish();
}

fn bench_memory_get(c: &mut Criterion) {
    let storage = Storage::open_in_memory().unwrap();
    let mut ids = Vec::new();
    for i in 0..1000 {
        let memory = sample_memory(i);
        ids.push(memory.id.clone());
        storage.with_connection(|conn| queries::insert(conn, &memory)).unwrap();
    }

    let mut group = c.benchmark_group("memory_get");
    group.throughput(Throughput::Elements(1));

    let mut idx = 0;
    group.bench_function("by_id", |b| {
        b.iter(|| {
            let id = &ids[idx % ids.len()];
            idx += 1;
            storage.with_connection(|conn| queries::get_by_id(conn, black_box(id))).unwrap()
        })
    });
    group.finish();
}

fn bench_memory_scan(c: &mut Criterion) {
    let storage = Storage::open_in_memory().unwrap();
    for i in 0..1000 {
        let memory = sample_memory(i);
        storage.with_connection(|conn| queries::insert(conn, &memory)).unwrap();
    }

    c.bench_function("memory_scan_active", |b| {
        b.iter(|| {
            storage
                .with_connection(|conn| {
                    queries::scan(
                        conn,
                        black_box(&ScanFilters { status: Some(MemoryStatus::Active), ..Default::default() }),
                        100,
                        true,
                    )
                })
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_memory_insert, bench_memory_get, bench_memory_scan);
criterion_main!(benches);
