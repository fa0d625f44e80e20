//! Tests for CompiledGraph
//!
//! Scheduler, interrupt and fan-out behaviour on single graphs. Subgraph and
//! persistence scenarios live in `tests/integration_tests.rs`.

#[cfg(test)]
mod tests {
    use crate::error::GraphError;
    use crate::state::StateError;
    use crate::{CompiledGraph, Route, RunInput, RunResult, Send, StateGraph, StateSchema, END, START};
    use serde_json::{json, Value};
    use stategraph_checkpoint::{CheckpointSource, Position};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn schema() -> StateSchema {
        StateSchema::new()
            .field("value")
            .field("answer")
            .field("parallel")
            .append_field("log")
    }

    fn log_node(graph: &mut StateGraph, name: &'static str) {
        graph.add_node(name, &["log"], move |_state, _ctx| async move {
            Ok(json!({ "log": [name] }))
        });
    }

    fn linear() -> CompiledGraph {
        let mut graph = StateGraph::new(schema());
        log_node(&mut graph, "a");
        log_node(&mut graph, "b");
        graph.add_edge(START, "a").add_edge("a", "b").add_edge("b", END);
        graph.compile().unwrap()
    }

    fn confirm_graph() -> CompiledGraph {
        let mut graph = StateGraph::new(schema());
        graph.add_node("review", &["answer"], |_state, ctx| async move {
            let answer = ctx.interrupt(json!("confirm?"))?;
            Ok(json!({ "answer": answer }))
        });
        log_node(&mut graph, "after");
        graph
            .add_edge(START, "review")
            .add_edge("review", "after")
            .add_edge("after", END);
        graph.compile().unwrap()
    }

    #[tokio::test]
    async fn test_linear_run_completes() {
        let compiled = linear();

        let result = compiled.run("t1", RunInput::Start(json!({"value": 1}))).await;
        let state = result.state().cloned().unwrap();
        assert_eq!(state["log"], json!(["a", "b"]));
        assert_eq!(state["value"], 1);

        let history = compiled.history("t1", None).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history[0].position.is_end());
        assert_eq!(history[2].metadata.source, CheckpointSource::Input);
        assert_eq!(history[0].metadata.step, 2);
    }

    #[tokio::test]
    async fn test_start_after_completion_begins_fresh() {
        let compiled = linear();

        compiled.run("t1", RunInput::Start(json!({}))).await;
        let second = compiled.run("t1", RunInput::Start(json!({}))).await;

        assert_eq!(second.state().unwrap()["log"], json!(["a", "b"]));
        let latest = compiled.latest_checkpoint("t1").await.unwrap().unwrap();
        assert_eq!(latest.seq, 5);
    }

    #[tokio::test]
    async fn test_start_on_suspended_thread_fails() {
        let compiled = confirm_graph();

        assert!(compiled.run("t1", RunInput::Start(json!({}))).await.is_suspended());
        let result = compiled.run("t1", RunInput::Start(json!({}))).await;
        assert!(matches!(result.error(), Some(GraphError::ThreadInProgress(t)) if t == "t1"));
    }

    #[tokio::test]
    async fn test_nothing_to_resume_is_an_error() {
        let compiled = linear();
        compiled.run("t1", RunInput::Start(json!({}))).await;

        let resumed = compiled.run("t1", RunInput::Resume(json!("yes"))).await;
        assert!(matches!(resumed.error(), Some(GraphError::NothingToResume(_))));

        let continued = compiled.run("t1", RunInput::Continue).await;
        assert!(matches!(continued.error(), Some(GraphError::NothingToResume(_))));

        // nothing was re-run
        assert_eq!(compiled.history("t1", None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_thread() {
        let compiled = linear();

        let resumed = compiled.run("missing", RunInput::Resume(json!(1))).await;
        assert!(matches!(resumed.error(), Some(GraphError::UnknownThread(t)) if t == "missing"));

        let continued = compiled.run("missing", RunInput::Continue).await;
        assert!(matches!(continued.error(), Some(GraphError::UnknownThread(_))));
    }

    #[tokio::test]
    async fn test_confirm_interrupt_then_resume() {
        let compiled = confirm_graph();

        let result = compiled.run("t1", RunInput::Start(json!({}))).await;
        let interrupt = result.interrupt().cloned().unwrap();
        assert_eq!(interrupt.payload, json!("confirm?"));
        assert_eq!(interrupt.node, "review");
        assert_eq!(interrupt.thread_id, "t1");

        let latest = compiled.latest_checkpoint("t1").await.unwrap().unwrap();
        assert!(latest.is_suspended());
        assert_eq!(latest.position, Position::Node("review".to_string()));

        let result = compiled.run("t1", RunInput::Resume(json!("yes"))).await;
        let state = result.state().unwrap();
        assert_eq!(state["answer"], "yes");
        assert_eq!(state["log"], json!(["after"]));
    }

    #[tokio::test]
    async fn test_interrupt_resume_is_transparent() {
        let suspended = confirm_graph();
        suspended.run("t1", RunInput::Start(json!({"value": 7}))).await;
        let resumed = suspended.run("t1", RunInput::Resume(json!("V"))).await;

        let mut graph = StateGraph::new(schema());
        graph.add_node("review", &["answer"], |_state, _ctx| async move {
            Ok(json!({ "answer": "V" }))
        });
        log_node(&mut graph, "after");
        graph
            .add_edge(START, "review")
            .add_edge("review", "after")
            .add_edge("after", END);
        let direct = graph
            .compile()
            .unwrap()
            .run("t1", RunInput::Start(json!({"value": 7})))
            .await;

        assert_eq!(resumed.state(), direct.state());
    }

    #[tokio::test]
    async fn test_multiple_interrupts_in_one_node() {
        let entries = Arc::new(AtomicUsize::new(0));
        let counter = entries.clone();

        let mut graph = StateGraph::new(schema());
        graph.add_node("sum", &["value"], move |_state, ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let first = ctx.interrupt(json!("first?"))?;
                let second = ctx.interrupt(json!("second?"))?;
                let total = first.as_i64().unwrap_or(0) + second.as_i64().unwrap_or(0);
                Ok(json!({ "value": total }))
            }
        });
        graph.add_edge(START, "sum").add_edge("sum", END);
        let compiled = graph.compile().unwrap();

        let first = compiled.run("t1", RunInput::Start(json!({}))).await;
        assert_eq!(first.interrupt().unwrap().payload, json!("first?"));

        let second = compiled.run("t1", RunInput::Resume(json!(1))).await;
        assert_eq!(second.interrupt().unwrap().payload, json!("second?"));

        let done = compiled.run("t1", RunInput::Resume(json!(2))).await;
        assert_eq!(done.state().unwrap()["value"], 3);
        assert_eq!(entries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_continue_on_suspended_thread_asks_again() {
        let compiled = confirm_graph();
        compiled.run("t1", RunInput::Start(json!({}))).await;

        let again = compiled.run("t1", RunInput::Continue).await;
        assert_eq!(again.interrupt().unwrap().payload, json!("confirm?"));

        let done = compiled.run("t1", RunInput::Resume(json!("ok"))).await;
        assert_eq!(done.state().unwrap()["answer"], "ok");
    }

    #[tokio::test]
    async fn test_node_failure_keeps_checkpoint_and_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let mut graph = StateGraph::new(schema());
        log_node(&mut graph, "a");
        graph.add_node("flaky", &["log"], move |_state, _ctx| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(GraphError::node_execution("flaky", "transient"));
                }
                Ok(json!({ "log": ["flaky"] }))
            }
        });
        graph.add_edge(START, "a").add_edge("a", "flaky").add_edge("flaky", END);
        let compiled = graph.compile().unwrap();

        let failed = compiled.run("t1", RunInput::Start(json!({}))).await;
        assert!(matches!(failed.error(), Some(GraphError::NodeExecution { node, .. }) if node == "flaky"));
        assert!(failed.error().unwrap().is_retryable());

        let latest = compiled.latest_checkpoint("t1").await.unwrap().unwrap();
        assert_eq!(latest.position, Position::Node("flaky".to_string()));
        assert_eq!(latest.state["log"], json!(["a"]));

        let retried = compiled.run("t1", RunInput::Continue).await;
        assert_eq!(retried.state().unwrap()["log"], json!(["a", "flaky"]));
    }

    #[tokio::test]
    async fn test_undeclared_write_rejected() {
        let mut graph = StateGraph::new(schema());
        graph.add_node("sneaky", &["value"], |_state, _ctx| async move {
            Ok(json!({ "value": 1, "answer": "x" }))
        });
        graph.add_edge(START, "sneaky").add_edge("sneaky", END);
        let compiled = graph.compile().unwrap();

        let result = compiled.run("t1", RunInput::Start(json!({}))).await;
        assert!(matches!(
            result.error(),
            Some(GraphError::State(StateError::UndeclaredWrite { field, .. })) if field == "answer"
        ));
    }

    #[tokio::test]
    async fn test_router_outside_allowed_set() {
        let mut graph = StateGraph::new(schema());
        log_node(&mut graph, "a");
        log_node(&mut graph, "b");
        graph.add_edge(START, "a");
        graph.add_conditional_edges("a", |_: &Value| Route::to("c"), &["b", END]);
        graph.add_edge("b", END);
        let compiled = graph.compile().unwrap();

        let result = compiled.run("t1", RunInput::Start(json!({}))).await;
        assert!(matches!(result.error(), Some(GraphError::Routing { node, .. }) if node == "a"));

        // the node's work was not committed
        let latest = compiled.latest_checkpoint("t1").await.unwrap().unwrap();
        assert_eq!(latest.position, Position::Node("a".to_string()));
        assert_eq!(latest.state["log"], json!([]));
    }

    fn diamond(barrier: Arc<tokio::sync::Barrier>) -> CompiledGraph {
        let mut graph = StateGraph::new(schema());
        log_node(&mut graph, "a");
        log_node(&mut graph, "b");
        for name in ["c", "d"] {
            let barrier = barrier.clone();
            graph.add_node(name, &["log"], move |_state, _ctx| {
                let barrier = barrier.clone();
                async move {
                    tokio::time::timeout(Duration::from_secs(5), barrier.wait())
                        .await
                        .map_err(|_| GraphError::node_execution(name, "sibling never ran"))?;
                    Ok(json!({ "log": [name] }))
                }
            });
        }
        graph.add_node("e", &["value"], |state, _ctx| async move {
            Ok(json!({ "value": state["log"].clone() }))
        });

        graph.add_edge(START, "a");
        graph.add_conditional_edges(
            "a",
            |state: &Value| {
                if state["parallel"] == true {
                    Route::many(["c", "d"])
                } else {
                    Route::to("b")
                }
            },
            &["b", "c", "d"],
        );
        graph.add_edge("b", "e").add_edge("c", "e").add_edge("d", "e").add_edge("e", END);
        graph.compile().unwrap()
    }

    #[tokio::test]
    async fn test_parallel_branches_join_before_successor() {
        let compiled = diamond(Arc::new(tokio::sync::Barrier::new(2)));

        let result = compiled
            .run("t1", RunInput::Start(json!({"parallel": true})))
            .await;
        let state = result.state().cloned().unwrap();

        let seen: Vec<&str> = state["value"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(seen[0], "a");
        assert!(seen.contains(&"c") && seen.contains(&"d"));
        assert_eq!(seen.len(), 3);

        let sequential = compiled.run("t2", RunInput::Start(json!({"parallel": false}))).await;
        assert_eq!(sequential.state().unwrap()["value"], json!(["a", "b"]));
    }

    fn fan_out(fail_on: Option<i64>) -> CompiledGraph {
        let schema = StateSchema::new().field("count").field("done").append_field("items");
        let mut graph = StateGraph::new(schema);

        graph.add_node("split", &[], |_state, _ctx| async move { Ok(Value::Null) });
        graph.add_node("worker", &["items"], move |input, _ctx| async move {
            let n = input["n"].as_i64().unwrap_or_default();
            if Some(n) == fail_on {
                return Err(GraphError::node_execution("worker", format!("cannot handle {}", n)));
            }
            Ok(json!({ "items": [n * 10] }))
        });
        graph.add_node("collect", &["done"], |_state, _ctx| async move {
            Ok(json!({ "done": true }))
        });

        graph.add_edge(START, "split");
        graph.add_fan_out_edge("split", "worker", |state: &Value| {
            let count = state["count"].as_i64().unwrap_or_default();
            (0..count).map(|n| Send::new("worker", json!({ "n": n }))).collect()
        });
        graph.add_edge("worker", "collect").add_edge("collect", END);
        graph.compile().unwrap()
    }

    #[tokio::test]
    async fn test_fan_out_merges_all_instances() {
        let compiled = fan_out(None);

        let result = compiled.run("t1", RunInput::Start(json!({"count": 3}))).await;
        let state = result.state().unwrap();

        let mut items: Vec<i64> = state["items"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_i64)
            .collect();
        items.sort();
        assert_eq!(items, vec![0, 10, 20]);
        assert_eq!(state["done"], true);
    }

    #[tokio::test]
    async fn test_empty_fan_out_joins_immediately() {
        let compiled = fan_out(None);

        let result = compiled.run("t1", RunInput::Start(json!({"count": 0}))).await;
        let state = result.state().unwrap();
        assert_eq!(state["items"], json!([]));
        assert_eq!(state["done"], true);
    }

    #[tokio::test]
    async fn test_fan_out_failure_leaves_parent_unchanged() {
        let compiled = fan_out(Some(2));

        let result = compiled.run("t1", RunInput::Start(json!({"count": 4}))).await;
        assert!(matches!(
            result.error(),
            Some(GraphError::JoinFailure { branch, .. }) if branch == "worker[2]"
        ));

        let latest = compiled.latest_checkpoint("t1").await.unwrap().unwrap();
        assert!(matches!(latest.position, Position::Branches(ref b) if b.len() == 4));
        assert_eq!(latest.state["items"], json!([]));
        assert!(latest.state.get("done").is_none());
    }

    #[tokio::test]
    async fn test_step_limit() {
        let mut graph = StateGraph::new(schema());
        graph.add_node("spin", &["value"], |state, _ctx| async move {
            Ok(json!({ "value": state["value"].as_i64().unwrap_or(0) + 1 }))
        });
        graph.add_edge(START, "spin");
        graph.add_conditional_edges(
            "spin",
            |state: &Value| {
                if state["value"].as_i64().unwrap_or(0) >= 8 {
                    Route::to(END)
                } else {
                    Route::to("spin")
                }
            },
            &["spin", END],
        );
        let compiled = graph.compile().unwrap().with_step_limit(5);

        let first = compiled.run("t1", RunInput::Start(json!({"value": 0}))).await;
        assert!(matches!(first.error(), Some(GraphError::StepLimitExceeded { limit: 5 })));
        let latest = compiled.latest_checkpoint("t1").await.unwrap().unwrap();
        assert_eq!(latest.state["value"], 5);

        let second = compiled.run("t1", RunInput::Continue).await;
        assert_eq!(second.state().unwrap()["value"], 8);
    }

    #[tokio::test]
    async fn test_run_context_reaches_nodes() {
        use crate::runtime::{ProgressSink, RunContext};
        use std::sync::Mutex;

        #[derive(Default)]
        struct Collect(Mutex<Vec<String>>);

        impl ProgressSink for Collect {
            fn emit(&self, _elapsed: Duration, message: &str) {
                self.0.lock().unwrap().push(message.to_string());
            }
        }

        let mut graph = StateGraph::new(schema());
        graph.add_node("a", &[], |_state, ctx| async move {
            ctx.log(format!("{} ran on {}", ctx.node(), ctx.thread_id()));
            Ok(Value::Null)
        });
        graph.add_edge(START, "a").add_edge("a", END);
        let compiled = graph.compile().unwrap();

        let sink = Arc::new(Collect::default());
        let ctx = RunContext::new().with_sink(sink.clone());
        let result = compiled
            .run_with_context("t1", RunInput::Start(json!({})), &ctx)
            .await;

        assert!(matches!(result, RunResult::Completed(_)));
        assert_eq!(*sink.0.lock().unwrap(), vec!["a ran on t1".to_string()]);
    }
}
