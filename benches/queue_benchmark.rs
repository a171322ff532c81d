use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use lmq::config::QueueConfig;
use lmq::journal::{JournalRecord, NetCounts};
use lmq::{Message, QueueManager};

fn create_messages(count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| Message::from(format!("payload-{i:08}")))
        .collect()
}

fn bench_store_enqueue_dequeue(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_enqueue_dequeue");

    for &init_size in [16usize, 1000].iter() {
        let messages = create_messages(10_000);
        group.throughput(Throughput::Elements(messages.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("init_size", init_size),
            &init_size,
            |b, &init_size| {
                b.iter(|| {
                    let store = QueueManager::new(&QueueConfig {
                        init_size,
                        max_size: None,
                    });
                    for msg in &messages {
                        black_box(store.enqueue("bench", msg.clone()));
                    }
                    while let Ok(msg) = store.dequeue("bench") {
                        black_box(msg);
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_record_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_codec");
    let record = JournalRecord::set("jobs", "hello world: file:docs/report 2024.pdf");
    let line = record.encode();

    group.bench_function("encode", |b| b.iter(|| black_box(record.encode())));
    group.bench_function("decode", |b| {
        b.iter(|| black_box(JournalRecord::decode(&line).unwrap()))
    });

    group.finish();
}

fn bench_replay_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay_fold");

    let mut segment = String::new();
    for i in 0..10_000 {
        let queue = format!("q{}", i % 8);
        let msg = format!("m{}", i % 512);
        segment.push_str(&JournalRecord::set(queue.as_str(), msg.as_str()).encode());
        segment.push('\n');
        if i % 3 == 0 {
            segment.push_str(&JournalRecord::get(queue.as_str(), msg.as_str()).encode());
            segment.push('\n');
        }
    }

    group.throughput(Throughput::Bytes(segment.len() as u64));
    group.bench_function("fold_lines", |b| {
        b.iter(|| {
            let mut counts = NetCounts::new();
            black_box(counts.fold_lines(segment.as_bytes(), "bench"));
            black_box(counts.materialize());
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_store_enqueue_dequeue,
    bench_record_codec,
    bench_replay_fold
);
criterion_main!(benches);
