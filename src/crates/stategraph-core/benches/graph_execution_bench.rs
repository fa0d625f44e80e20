use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};
use stategraph_core::{CompiledGraph, RunInput, Send, StateGraph, StateSchema, END, START};

fn linear_graph(len: usize) -> CompiledGraph {
    let mut graph = StateGraph::new(StateSchema::new().append_field("log"));
    let names: Vec<String> = (0..len).map(|i| format!("node_{}", i)).collect();

    for name in &names {
        let label = name.clone();
        graph.add_node(name.as_str(), &["log"], move |_state, _ctx| {
            let label = label.clone();
            async move { Ok(json!({ "log": [label] })) }
        });
    }

    graph.add_edge(START, names[0].as_str());
    for pair in names.windows(2) {
        graph.add_edge(pair[0].as_str(), pair[1].as_str());
    }
    graph.add_edge(names[len - 1].as_str(), END);
    graph.compile().unwrap()
}

fn fan_out_graph() -> CompiledGraph {
    let mut graph = StateGraph::new(StateSchema::new().field("count").append_field("items"));
    graph.add_node("split", &[], |_state, _ctx| async move { Ok(Value::Null) });
    graph.add_node("square", &["items"], |input, _ctx| async move {
        let n = input["n"].as_i64().unwrap_or_default();
        Ok(json!({ "items": [n * n] }))
    });
    graph.add_edge(START, "split");
    graph.add_fan_out_edge("split", "square", |state: &Value| {
        let count = state["count"].as_i64().unwrap_or_default();
        (0..count).map(|n| Send::new("square", json!({ "n": n }))).collect()
    });
    graph.add_edge("square", END);
    graph.compile().unwrap()
}

fn linear_execution_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let compiled = linear_graph(10);
    let mut run = 0u64;

    c.bench_function("linear graph 10 nodes", |b| {
        b.iter(|| {
            run += 1;
            let thread = format!("bench-{}", run);
            runtime.block_on(async {
                black_box(compiled.run(&thread, RunInput::Start(json!({}))).await);
            })
        });
    });
}

fn fan_out_execution_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let compiled = fan_out_graph();
    let mut run = 0u64;

    c.bench_function("fan-out 16 instances", |b| {
        b.iter(|| {
            run += 1;
            let thread = format!("bench-{}", run);
            runtime.block_on(async {
                black_box(compiled.run(&thread, RunInput::Start(json!({ "count": 16 }))).await);
            })
        });
    });
}

criterion_group!(benches, linear_execution_benchmark, fan_out_execution_benchmark);
criterion_main!(benches);
