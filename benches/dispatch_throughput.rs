//! Validation and local dispatch throughput benchmark.
//!
//! Measures schema validation over growing inputs and the full
//! lookup → validate → spawn → envelope path for a local tool
//! using Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use tooldock::credentials::StaticCredentialResolver;
use tooldock::dispatch::{Dispatcher, ExecutionContext, InvocationRequest};
use tooldock::schema::{validate, SchemaNode, ValidatedInput};
use tooldock::tools::{HandlerError, ToolDescriptor, ToolRegistry};
use tooldock::types::{CallerId, DispatchConfig};

fn order_schema() -> SchemaNode {
    SchemaNode::object()
        .field("customer", SchemaNode::string())
        .field(
            "items",
            SchemaNode::array(
                SchemaNode::object()
                    .field("sku", SchemaNode::string())
                    .field("qty", SchemaNode::integer())
                    .field("note", SchemaNode::string().optional()),
            ),
        )
        .build()
}

fn order_input(items: usize) -> Value {
    let items: Vec<Value> = (0..items)
        .map(|i| json!({"sku": format!("sku-{}", i), "qty": i}))
        .collect();
    json!({"customer": "c-1", "items": items})
}

fn bench_validate(c: &mut Criterion) {
    let schema = order_schema();
    let sizes: &[usize] = &[1, 16, 256, 4096];

    let mut group = c.benchmark_group("validate");
    for &size in sizes {
        let input = order_input(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| validate(&schema, black_box(input)).unwrap());
        });
    }
    group.finish();
}

fn bench_local_invoke(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let registry = Arc::new(ToolRegistry::new());
    registry
        .register(
            ToolDescriptor::local(
                "add_numbers",
                "Add two integers",
                SchemaNode::object()
                    .field("a", SchemaNode::integer())
                    .field("b", SchemaNode::integer()),
                |input: ValidatedInput, _ctx: ExecutionContext| async move {
                    let a = input.get("a").and_then(Value::as_i64).unwrap_or(0);
                    let b = input.get("b").and_then(Value::as_i64).unwrap_or(0);
                    Ok::<_, HandlerError>(json!(a + b))
                },
            )
            .build()
            .unwrap(),
        )
        .unwrap();
    let dispatcher = Dispatcher::new(
        registry,
        Arc::new(StaticCredentialResolver::new()),
        DispatchConfig::default(),
    )
    .unwrap();
    let caller = CallerId::try_from("bench").unwrap();

    c.bench_function("invoke_local", |b| {
        b.iter(|| {
            rt.block_on(async {
                let request =
                    InvocationRequest::new("add_numbers", json!({"a": 2, "b": 3}), caller.clone());
                dispatcher.invoke(black_box(request), CancellationToken::new()).await
            })
        });
    });

    c.bench_function("invoke_batch_64", |b| {
        b.iter(|| {
            rt.block_on(async {
                let requests = (0..64)
                    .map(|i| InvocationRequest::new("add_numbers", json!({"a": i, "b": 1}), caller.clone()))
                    .collect();
                dispatcher.invoke_batch(requests, &CancellationToken::new()).await
            })
        });
    });
}

criterion_group!(benches, bench_validate, bench_local_invoke);
criterion_main!(benches);
