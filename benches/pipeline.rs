//! Ingestion throughput benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use mocaplink_core::core::hub::Hub;
use mocaplink_core::core::pipeline::TelemetryPipeline;
use mocaplink_core::core::protocol::{decode, FrameDemux};
use std::sync::Arc;

/// A realistic stream: five-sensor frames with the occasional log line.
fn sample_stream(frames: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for seq in 0..frames {
        out.extend_from_slice(format!("DATA:SEQ:{},", seq % 65536).as_bytes());
        for id in 0..5 {
            out.extend_from_slice(
                format!("S{id}:[0.7071,0.0,{},0.7071],", id as f64 * 0.01).as_bytes(),
            );
        }
        if seq % 50 == 0 {
            out.extend_from_slice(b"LOG:[DEBUG] HEARTBEAT\n");
        }
    }
    out.extend_from_slice(b"DATA:");
    out
}

fn demux_benchmark(c: &mut Criterion) {
    let stream = sample_stream(1000);

    let mut group = c.benchmark_group("demux");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("whole_stream", |b| {
        b.iter(|| {
            let mut demux = FrameDemux::new();
            let records = demux.ingest(black_box(&stream));
            black_box(records)
        })
    });

    group.bench_function("64_byte_chunks", |b| {
        b.iter(|| {
            let mut demux = FrameDemux::new();
            let mut total = 0usize;
            for chunk in stream.chunks(64) {
                total += demux.ingest(black_box(chunk)).len();
            }
            black_box(total)
        })
    });

    group.finish();
}

fn decode_benchmark(c: &mut Criterion) {
    let payload = "SEQ:1234,S0:[0.7071,0.0,0.0,0.7071],S1:[1.0,0.0,0.0,0.0],\
                   S2:[0.5,0.5,0.5,0.5],S3:[0.9,0.1,0.0,0.0],S4:[0.0,1.0,0.0,0.0],";

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("five_sensor_frame", |b| {
        b.iter(|| {
            let frame = decode(black_box(payload));
            black_box(frame)
        })
    });
    group.finish();
}

fn pipeline_benchmark(c: &mut Criterion) {
    let stream = sample_stream(1000);

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("ingest_chunked", |b| {
        b.iter(|| {
            let mut pipeline = TelemetryPipeline::new(Arc::new(Hub::default()));
            let mut total = 0usize;
            for chunk in stream.chunks(512) {
                total += pipeline.ingest_chunk(black_box(chunk));
            }
            black_box(total)
        })
    });
    group.finish();
}

criterion_group!(benches, demux_benchmark, decode_benchmark, pipeline_benchmark);
criterion_main!(benches);
