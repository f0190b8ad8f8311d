//! # HSTP Benchmarks
//!
//! | Area | Operation |
//! |------|-----------|
//! | Frame codec | encode/decode of a header plus payload |
//! | Addressing | identity normalization and topic layout |
//! | Correlation | register then complete one response |

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hstp_transport::codec::{decode_frame, encode_frame};
use hstp_transport::{normalize, CorrelationTable, TopicLayout};
use hstp_types::{Did, Header, Message};
use std::sync::Arc;

fn header() -> Header {
    Header::builder("update", Did::parse("did:key:alice").unwrap())
        .destination(Did::parse("did:web:example.org:users:bob").unwrap())
        .expect_response(true)
        .property("authorization", "Bearer token")
        .build()
        .unwrap()
}

fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame-codec");
    let header = header();

    for size in [0usize, 1024, 64 * 1024] {
        let payload = vec![0xAB; size];
        let frame = encode_frame(&header, &payload).unwrap();

        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::new("encode", size), &payload, |b, payload| {
            b.iter(|| black_box(encode_frame(&header, payload).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &frame, |b, frame| {
            b.iter(|| black_box(decode_frame(Bytes::clone(frame)).unwrap()))
        });
    }
    group.finish();
}

fn bench_addressing(c: &mut Criterion) {
    let mut group = c.benchmark_group("addressing");
    let layout = TopicLayout::new("hstp");
    let header = header();

    group.bench_function("normalize", |b| {
        b.iter(|| black_box(normalize("did:web:example.org:users:bob%20smith")))
    });
    group.bench_function("topic_for_header", |b| {
        b.iter(|| black_box(layout.for_header(&header)))
    });
    group.finish();
}

fn bench_correlation(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let table = Arc::new(CorrelationTable::new());
    let source = Did::parse("did:key:bob").unwrap();

    c.bench_function("correlation/register_complete", |b| {
        b.iter(|| {
            let request = header();
            let pending = table.register(request.id, &request.operation);
            let reply = request.reply("done", source.clone()).build().unwrap();
            table.complete(Message::without_payload(reply));
            black_box(runtime.block_on(pending.wait(std::time::Duration::from_secs(1))))
        })
    });
}

criterion_group!(benches, bench_frame_codec, bench_addressing, bench_correlation);
criterion_main!(benches);
