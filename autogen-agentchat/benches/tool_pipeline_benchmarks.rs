//! Benchmarks for the tool result pipeline
//!
//! Measures argument marshaling, observation normalization and model
//! response interpretation, the work done on every tool call.

use autogen_agentchat::models::CreateResultContent;
use autogen_agentchat::reasoning::interpret;
use autogen_agentchat::tools::{
    marshal_args, InputSchema, NormalizerConfig, OutputKind, OutputNormalizer, ParamType, ParameterSpec,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};

fn schema() -> InputSchema {
    InputSchema::new(vec![
        ParameterSpec::required("city", ParamType::String),
        ParameterSpec::required("days", ParamType::Integer),
        ParameterSpec::optional("metric", ParamType::Boolean),
        ParameterSpec::optional("start", ParamType::Date),
        ParameterSpec::optional("tags", ParamType::Array),
    ])
}

/// Benchmark argument marshaling with and without coercion
fn bench_marshal(c: &mut Criterion) {
    let schema = schema();
    let mut group = c.benchmark_group("marshal_args");

    let exact = json!({"city": "Oslo", "days": 3, "metric": true, "start": "2024-05-01", "tags": ["a"]});
    group.bench_function("exact_types", |b| {
        b.iter(|| black_box(marshal_args(&schema, black_box(&exact))))
    });

    let coerced = json!({"city": "Oslo", "days": "3", "metric": "true", "start": "2024-05-01"});
    group.bench_function("coerced_strings", |b| {
        b.iter(|| black_box(marshal_args(&schema, black_box(&coerced))))
    });

    let encoded = Value::String(exact.to_string());
    group.bench_function("json_encoded_object", |b| {
        b.iter(|| black_box(marshal_args(&schema, black_box(&encoded))))
    });

    group.finish();
}

fn structured_payload(fields: usize) -> Value {
    let items: Vec<Value> = (0..fields)
        .map(|i| json!({"id": i, "title": format!("result {}", i), "score": i as f64 / 10.0}))
        .collect();
    json!({"query": "rust", "results": items})
}

/// Benchmark normalization of structured payloads of growing size
fn bench_normalize(c: &mut Criterion) {
    let normalizer = OutputNormalizer::new(NormalizerConfig::default());
    let mut group = c.benchmark_group("normalize_structured");

    for size in [10, 100, 1000] {
        let payload = structured_payload(size);
        group.bench_with_input(BenchmarkId::new("all_fields", size), &payload, |b, payload| {
            b.iter(|| black_box(normalizer.normalize(OutputKind::Structured, payload, &[])))
        });
        let interest = vec!["results.title".to_string()];
        group.bench_with_input(BenchmarkId::new("with_interest", size), &payload, |b, payload| {
            b.iter(|| black_box(normalizer.normalize(OutputKind::Structured, payload, &interest)))
        });
    }

    let text = Value::String("lorem ipsum ".repeat(2_000));
    group.bench_function("long_text", |b| {
        b.iter(|| black_box(normalizer.normalize(OutputKind::Text, &text, &[])))
    });

    group.finish();
}

/// Benchmark interpretation of free-text model replies
fn bench_interpret(c: &mut Criterion) {
    let fenced = CreateResultContent::Text(
        "I need a tool.\n```json\n{\"tools_needed\": true, \"tool_calls\": [{\"tool\": \"weather\", \"parameters\": {\"city\": \"Oslo\"}}]}\n```"
            .to_string(),
    );
    let plain = CreateResultContent::Text("The forecast for Oslo is sunny all week.".to_string());

    c.bench_function("interpret_fenced_call", |b| b.iter(|| black_box(interpret(black_box(&fenced)))));
    c.bench_function("interpret_plain_answer", |b| b.iter(|| black_box(interpret(black_box(&plain)))));
}

criterion_group!(benches, bench_marshal, bench_normalize, bench_interpret);
criterion_main!(benches);
