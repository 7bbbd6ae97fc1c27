//! Micro-benchmarks for the hot parsing paths: qualified model strings and
//! upstream SSE chunk bodies.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use aigateway::providers::registry::{parse_piece, split_fallbacks};
use aigateway::providers::sse::parse_stream_chunk;

fn bench_model_parsing(c: &mut Criterion) {
    c.bench_function("parse_single_model", |b| {
        b.iter(|| parse_piece(black_box("openai/gpt-4o")))
    });

    c.bench_function("parse_fallback_chain", |b| {
        b.iter(|| {
            let pieces = split_fallbacks(black_box(
                "openai/gpt-4o|groq/llama-3.3-70b-versatile|mistral/mistral-large-latest",
            ));
            pieces
                .iter()
                .map(|piece| parse_piece(piece))
                .collect::<Vec<_>>()
        })
    });
}

fn bench_chunk_parsing(c: &mut Criterion) {
    let chunk = br#"{
        "id": "chatcmpl-abc123",
        "object": "chat.completion.chunk",
        "created": 1700000000,
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "delta": {"content": "The quick brown fox jumps over the lazy dog"},
            "finish_reason": null
        }]
    }"#;

    c.bench_function("parse_stream_chunk", |b| {
        b.iter(|| parse_stream_chunk(black_box(chunk)))
    });
}

criterion_group!(benches, bench_model_parsing, bench_chunk_parsing);
criterion_main!(benches);
