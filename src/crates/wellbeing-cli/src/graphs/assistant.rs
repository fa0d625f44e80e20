//! Wellbeing assistant graph
//!
//! ```text
//! START -> advice_planning -> start_consultations =fan-out=> consultation[i] -> plan_writer -> END
//! ```
//!
//! `advice_planning` suspends for user feedback on the draft. Once the plan is
//! approved, one consultation runs per step and their sections are appended
//! to `sections` before the plan writer consolidates them.

use super::{add_node_with, ask, consultation, planning, text, Collaborators};
use crate::prompts::{self, fill};
use llm::Message;
use serde_json::{json, Value};
use stategraph_core::{CompiledGraph, NodeContext, Result, Send, StateGraph, StateSchema, END, START};

pub const ADVICE_PLANNING: &str = "advice_planning";
pub const START_CONSULTATIONS: &str = "start_consultations";
pub const CONSULTATION: &str = "consultation";
pub const PLAN_WRITER: &str = "plan_writer";

pub fn schema() -> StateSchema {
    StateSchema::new()
        .field("problem")
        .with_default("max_steps", json!(3))
        .with_default("max_cycles", json!(2))
        .field("steps")
        .append_field("sections")
        .field("final_plan")
}

/// Fresh input for a session about `problem`.
pub fn input(problem: &str, max_steps: u32, max_cycles: u32) -> Value {
    json!({
        "problem": problem,
        "max_steps": max_steps,
        "max_cycles": max_cycles
    })
}

async fn start_consultations(_deps: Collaborators, _state: Value, ctx: NodeContext) -> Result<Value> {
    ctx.log("[Consultation] Searching evidence for the drafted plan...");
    Ok(Value::Null)
}

/// One consultation per planned step.
fn map_to_consultation(state: &Value) -> Vec<Send> {
    let max_cycles = state.get("max_cycles").cloned().unwrap_or(json!(2));
    state["steps"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|step| {
            Send::new(
                CONSULTATION,
                json!({
                    "step": step,
                    "problem": state["problem"],
                    "max_cycles": max_cycles
                }),
            )
        })
        .collect()
}

async fn plan_writer(deps: Collaborators, state: Value, ctx: NodeContext) -> Result<Value> {
    ctx.log("[Finalising] Writing final version of personalised wellbeing action plan...");

    let sections: Vec<String> = super::field(&state, "sections")?.unwrap_or_default();
    let sections = sections.join("\n\n---\n\n");
    let instructions = fill(
        prompts::PLAN_WRITER,
        &[("problem", text(&state, "problem")), ("sections", sections.as_str())],
    );
    let messages = vec![
        Message::system(instructions),
        Message::assistant("Write a finished version of the Wellbeing Action Plan"),
    ];

    let final_plan = ask(deps.chat.as_ref(), PLAN_WRITER, messages).await?;
    if !final_plan.is_empty() {
        ctx.log("[Completed] Plan successfully generated!");
    }
    Ok(json!({ "final_plan": final_plan }))
}

/// Build the assistant graph with both subgraphs. `step_limit` applies to
/// every graph, per call to `run`.
pub fn build(deps: &Collaborators, step_limit: usize) -> Result<CompiledGraph> {
    let planning = planning::build(deps)?.with_step_limit(step_limit);
    let consultation = consultation::build(deps)?.with_step_limit(step_limit);

    let mut graph = StateGraph::new(schema());
    graph.add_subgraph(ADVICE_PLANNING, planning);
    add_node_with(&mut graph, START_CONSULTATIONS, &[], deps, start_consultations);
    graph.add_subgraph(CONSULTATION, consultation);
    add_node_with(&mut graph, PLAN_WRITER, &["final_plan"], deps, plan_writer);

    graph.add_edge(START, ADVICE_PLANNING);
    graph.add_edge(ADVICE_PLANNING, START_CONSULTATIONS);
    graph.add_fan_out_edge(START_CONSULTATIONS, CONSULTATION, map_to_consultation);
    graph.add_edge(CONSULTATION, PLAN_WRITER);
    graph.add_edge(PLAN_WRITER, END);

    Ok(graph.compile()?.with_step_limit(step_limit))
}

/// Step limit large enough for consultations of `max_cycles` exchanges.
///
/// A consultation spends up to five steps per exchange.
pub fn step_limit_for(max_cycles: u32) -> usize {
    stategraph_core::DEFAULT_STEP_LIMIT.max(6 * max_cycles as usize + 10)
}
