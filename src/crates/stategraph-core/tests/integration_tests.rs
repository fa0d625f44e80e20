//! Integration tests for composite workflows
//!
//! Subgraphs, fan-out over subgraph instances, and persistence across
//! process restarts, exercised through the public run API only.

use serde_json::{json, Value};
use stategraph_core::checkpoint::{
    CheckpointSaver, FileCheckpointSaver, InMemoryCheckpointSaver, Position,
};
use stategraph_core::{
    CompiledGraph, GraphError, RunInput, Send, StateGraph, StateSchema, END, START,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// draft -> human -> END, handing back only `plan`
fn planning_subgraph() -> CompiledGraph {
    let schema = StateSchema::new().field("problem").field("plan").field("feedback");
    let mut graph = StateGraph::new(schema);

    graph.add_node("draft", &["plan"], |state, _ctx| async move {
        let problem = state["problem"].as_str().unwrap_or_default().to_string();
        Ok(json!({ "plan": format!("plan for {}", problem) }))
    });
    graph.add_node("human", &["plan", "feedback"], |state, ctx| async move {
        let plan = state["plan"].as_str().unwrap_or_default().to_string();
        let feedback = ctx.interrupt(json!({ "plan": plan }))?;
        let note = feedback.as_str().unwrap_or_default();
        Ok(json!({ "plan": format!("{} / {}", plan, note), "feedback": feedback }))
    });
    graph
        .add_edge(START, "draft")
        .add_edge("draft", "human")
        .add_edge("human", END)
        .with_output(&["plan"]);

    graph.compile().unwrap()
}

fn assistant(saver: Arc<dyn CheckpointSaver>) -> CompiledGraph {
    let schema = StateSchema::new().field("problem").field("plan").field("report");
    let mut graph = StateGraph::new(schema);

    graph.add_subgraph("planning", planning_subgraph());
    graph.add_node("writer", &["report"], |state, _ctx| async move {
        let plan = state["plan"].as_str().unwrap_or_default().to_string();
        Ok(json!({ "report": format!("report: {}", plan) }))
    });
    graph
        .add_edge(START, "planning")
        .add_edge("planning", "writer")
        .add_edge("writer", END);

    graph.compile().unwrap().with_checkpointer(saver)
}

#[tokio::test]
async fn test_subgraph_interrupt_reaches_caller() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let compiled = assistant(saver.clone());

    let result = compiled
        .run("session", RunInput::Start(json!({"problem": "stress"})))
        .await;
    let interrupt = result.interrupt().cloned().unwrap();
    assert_eq!(interrupt.thread_id, "session/planning");
    assert_eq!(interrupt.node, "human");
    assert_eq!(interrupt.payload, json!({"plan": "plan for stress"}));

    // the parent records the same interrupt against the composite node
    let parent = saver.get_latest("session").await.unwrap().unwrap();
    assert_eq!(parent.position, Position::Node("planning".to_string()));
    let pending = parent.interrupt.unwrap();
    assert_eq!(pending.id, interrupt.id);
    assert_eq!(pending.node, "planning");

    let child = saver.get_latest("session/planning").await.unwrap().unwrap();
    assert!(child.is_suspended());
    assert_eq!(child.metadata.parent_thread.as_deref(), Some("session"));

    let result = compiled.run("session", RunInput::Resume(json!("fine"))).await;
    let state = result.state().unwrap();
    assert_eq!(state["report"], "report: plan for stress / fine");
    assert!(state.get("feedback").is_none());
}

#[tokio::test]
async fn test_slash_in_top_level_thread_is_not_a_parent() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let compiled = assistant(saver.clone());

    compiled
        .run("team/alice", RunInput::Start(json!({"problem": "stress"})))
        .await;

    let top = saver.get_latest("team/alice").await.unwrap().unwrap();
    assert_eq!(top.metadata.parent_thread, None);

    let child = saver.get_latest("team/alice/planning").await.unwrap().unwrap();
    assert_eq!(child.metadata.parent_thread.as_deref(), Some("team/alice"));
}

#[tokio::test]
async fn test_continue_on_suspended_subgraph_asks_again() {
    let compiled = assistant(Arc::new(InMemoryCheckpointSaver::new()));

    let first = compiled
        .run("session", RunInput::Start(json!({"problem": "sleep"})))
        .await;
    let again = compiled.run("session", RunInput::Continue).await;

    assert_eq!(first.interrupt().unwrap().payload, again.interrupt().unwrap().payload);
    assert_eq!(again.interrupt().unwrap().thread_id, "session/planning");
}

#[tokio::test]
async fn test_subgraph_restarts_on_next_parent_run() {
    let compiled = assistant(Arc::new(InMemoryCheckpointSaver::new()));

    compiled.run("session", RunInput::Start(json!({"problem": "a"}))).await;
    compiled.run("session", RunInput::Resume(json!("ok"))).await;

    let second = compiled
        .run("session", RunInput::Start(json!({"problem": "b"})))
        .await;
    assert_eq!(second.interrupt().unwrap().payload, json!({"plan": "plan for b"}));
}

#[tokio::test]
async fn test_resume_after_restart_with_file_checkpoints() {
    let dir = tempfile::tempdir().unwrap();

    {
        let saver = FileCheckpointSaver::new(dir.path()).await.unwrap();
        let compiled = assistant(Arc::new(saver));
        let result = compiled
            .run("session", RunInput::Start(json!({"problem": "focus"})))
            .await;
        assert!(result.is_suspended());
    }

    let saver = FileCheckpointSaver::new(dir.path()).await.unwrap();
    let compiled = assistant(Arc::new(saver));
    let result = compiled.run("session", RunInput::Resume(json!("good"))).await;
    assert_eq!(result.state().unwrap()["report"], "report: plan for focus / good");

    let history = compiled.history("session", None).await.unwrap();
    assert!(history[0].position.is_end());
}

fn research_subgraph() -> CompiledGraph {
    let schema = StateSchema::new().field("topic").field("findings");
    let mut graph = StateGraph::new(schema);

    graph.add_node("research", &["findings"], |state, _ctx| async move {
        let topic = state["topic"].as_str().unwrap_or_default().to_string();
        Ok(json!({ "findings": format!("notes on {}", topic) }))
    });
    graph
        .add_edge(START, "research")
        .add_edge("research", END)
        .with_output(&["findings"]);

    graph.compile().unwrap()
}

fn consultation(saver: Arc<dyn CheckpointSaver>, arg: fn(&str) -> Value) -> CompiledGraph {
    let schema = StateSchema::new()
        .field("topics")
        .field("summary")
        .append_field("findings");
    let mut graph = StateGraph::new(schema);

    graph.add_node("plan", &["topics"], |_state, _ctx| async move {
        Ok(json!({ "topics": ["sleep", "exercise", "diet"] }))
    });
    graph.add_subgraph("consult", research_subgraph());
    graph.add_node("summarize", &["summary"], |state, _ctx| async move {
        let count = state["findings"].as_array().map_or(0, Vec::len);
        Ok(json!({ "summary": format!("{} findings", count) }))
    });

    graph.add_edge(START, "plan");
    graph.add_fan_out_edge("plan", "consult", move |state: &Value| {
        state["topics"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(|topic| Send::new("consult", arg(topic)))
            .collect()
    });
    graph.add_edge("consult", "summarize").add_edge("summarize", END);

    graph.compile().unwrap().with_checkpointer(saver)
}

#[tokio::test]
async fn test_fan_out_over_subgraph_instances() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let compiled = consultation(saver.clone(), |topic| json!({ "topic": topic }));

    let result = compiled.run("t", RunInput::Start(json!({}))).await;
    let state = result.state().unwrap();

    let mut findings: Vec<&str> = state["findings"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    findings.sort();
    assert_eq!(findings, vec!["notes on diet", "notes on exercise", "notes on sleep"]);
    assert_eq!(state["summary"], "3 findings");

    assert_eq!(
        saver.thread_ids().await,
        vec!["t", "t/consult[0]", "t/consult[1]", "t/consult[2]"]
    );
}

#[tokio::test]
async fn test_fan_out_input_outside_child_schema_is_rejected() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let compiled = consultation(saver.clone(), |topic| json!({ "subject": topic }));

    let result = compiled.run("t", RunInput::Start(json!({}))).await;
    assert!(matches!(result.error(), Some(GraphError::Routing { node, .. }) if node == "plan"));
    assert_eq!(saver.thread_ids().await, vec!["t"]);
}

#[tokio::test]
async fn test_failed_subgraph_continues_from_its_own_checkpoint() {
    let prepared = Arc::new(AtomicUsize::new(0));
    let attempts = Arc::new(AtomicUsize::new(0));

    let child = {
        let mut graph = StateGraph::new(StateSchema::new().append_field("log"));
        let prepared = prepared.clone();
        graph.add_node("prepare", &["log"], move |_state, _ctx| {
            prepared.fetch_add(1, Ordering::SeqCst);
            async move { Ok(json!({ "log": ["prepare"] })) }
        });
        let attempts = attempts.clone();
        graph.add_node("flaky", &["log"], move |_state, _ctx| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    return Err(GraphError::node_execution("flaky", "upstream unavailable"));
                }
                Ok(json!({ "log": ["flaky"] }))
            }
        });
        graph
            .add_edge(START, "prepare")
            .add_edge("prepare", "flaky")
            .add_edge("flaky", END);
        graph.compile().unwrap()
    };

    let mut parent = StateGraph::new(StateSchema::new().append_field("log"));
    parent.add_subgraph("inner", child);
    parent.add_edge(START, "inner").add_edge("inner", END);
    let compiled = parent.compile().unwrap();

    let failed = compiled.run("t", RunInput::Start(json!({}))).await;
    assert!(matches!(failed.error(), Some(GraphError::NodeExecution { node, .. }) if node == "flaky"));

    let retried = compiled.run("t", RunInput::Continue).await;
    assert_eq!(retried.state().unwrap()["log"], json!(["prepare", "flaky"]));
    assert_eq!(prepared.load(Ordering::SeqCst), 1);
}
