//! Frame encoding/decoding benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use livedm_protocol::{decode, AuthParams, BodyEncoding, Encoder};
use serde_json::{json, Value};

fn create_messages(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "cmd": "DANMU_MSG",
                "info": [
                    [0, 1, 25, 16777215, 1700000000000_u64 + i as u64],
                    format!("message number {}", i),
                    [10000 + i, format!("viewer{}", i), 0, 0, 0, 10000, 1, ""],
                    [21, "Medal", "streamer", 21452505, 0, "", 0],
                    [18, 0, 6406234, ">50000"]
                ]
            })
        })
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    group.bench_function("heartbeat", |b| b.iter(|| black_box(Encoder::heartbeat())));

    let params = AuthParams::new(12345, 21452505, "x".repeat(200));
    group.bench_function("auth", |b| {
        b.iter(|| black_box(Encoder::auth(&params).unwrap()))
    });

    group.finish();
}

fn bench_decode_plain(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_plain");

    for size in [100, 1000, 10000] {
        let frame = Encoder::message_reply(&json!({
            "cmd": "DANMU_MSG",
            "data": "x".repeat(size),
        }))
        .unwrap();

        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| black_box(decode(frame).unwrap()));
        });
    }

    group.finish();
}

fn bench_decode_compressed(c: &mut Criterion) {
    for (name, encoding) in [
        ("decode_deflate", BodyEncoding::Deflate),
        ("decode_brotli", BodyEncoding::Brotli),
    ] {
        let mut group = c.benchmark_group(name);

        for count in [1, 10, 100] {
            let frame = Encoder::compressed_message_reply(encoding, &create_messages(count)).unwrap();

            group.throughput(Throughput::Elements(count as u64));
            group.bench_with_input(BenchmarkId::from_parameter(count), &frame, |b, frame| {
                b.iter(|| black_box(decode(frame).unwrap()));
            });
        }

        group.finish();
    }
}

fn bench_heartbeat_reply(c: &mut Criterion) {
    let frame = Encoder::heartbeat_reply(123456);
    c.bench_function("decode_heartbeat_reply", |b| {
        b.iter(|| black_box(decode(&frame).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode_plain,
    bench_decode_compressed,
    bench_heartbeat_reply,
);

criterion_main!(benches);
