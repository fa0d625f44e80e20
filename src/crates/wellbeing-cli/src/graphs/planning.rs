//! Advice planning subgraph
//!
//! ```text
//! START -> advice_planner -> [reviewed enough?] -> feedback_generator -> advice_planner
//!                                  |
//!                                  v
//!                           human_feedback -> [user feedback?] -> advice_planner
//!                                  |
//!                                  v
//!                           plan_formatting -> END
//! ```
//!
//! The planner and the reviewer take turns until the reviewer approves or
//! `max_cycles` is reached. The draft is then shown to the user; any feedback
//! restarts the review loop with a fresh cycle budget.

use super::{add_node_with, ask, conversation, required, tail, text, Collaborators};
use crate::error::node_failure;
use crate::models::Steps;
use crate::prompts::{self, fill};
use llm::{structured_output, ChatRequest, Message};
use serde_json::{json, Value};
use stategraph_core::{CompiledGraph, NodeContext, Result, Route, StateGraph, StateSchema, END, START};

pub const ADVICE_PLANNER: &str = "advice_planner";
pub const FEEDBACK_GENERATOR: &str = "feedback_generator";
pub const HUMAN_FEEDBACK: &str = "human_feedback";
pub const PLAN_FORMATTING: &str = "plan_formatting";

/// Speaker names on planning messages
pub const PLANNER: &str = "planner";
pub const REVIEWER: &str = "reviewer";
pub const USER: &str = "user";

/// Messages the planner and reviewer see
const HISTORY: usize = 5;

pub fn schema() -> StateSchema {
    StateSchema::new()
        .field("problem")
        .with_default("max_steps", json!(3))
        .with_default("max_cycles", json!(2))
        .field("plan")
        .field("steps")
        .with_default("cycles_counter", json!(-1))
        .with_default("user_feedback", json!(false))
        .append_field("messages")
}

/// Where the planner loop stands after a draft
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    MaxCycles,
    Approved,
    NeedsReview,
}

/// `previous` is the message before the latest draft, if any.
fn verdict(cycles: i64, max_cycles: i64, previous: Option<&Message>) -> Verdict {
    if cycles >= max_cycles {
        Verdict::MaxCycles
    } else if previous.is_some_and(|m| m.is_from(REVIEWER) && m.content.contains(prompts::APPROVAL)) {
        Verdict::Approved
    } else {
        Verdict::NeedsReview
    }
}

fn max_cycles(state: &Value) -> i64 {
    state["max_cycles"].as_i64().unwrap_or(2)
}

async fn advice_planner(deps: Collaborators, state: Value, ctx: NodeContext) -> Result<Value> {
    let mut cycles = state["cycles_counter"].as_i64().unwrap_or(-1);
    if state["user_feedback"].as_bool().unwrap_or(false) {
        cycles = -1;
    }
    if cycles == -1 {
        ctx.log("[Planner] Drafting the plan...");
    }

    let history = conversation(&state)?;
    let max_steps = state["max_steps"].as_i64().unwrap_or(3).to_string();
    let instructions = fill(
        prompts::PLANNER,
        &[("problem", text(&state, "problem")), ("max_steps", max_steps.as_str())],
    );
    let mut messages = vec![
        Message::system(instructions),
        Message::assistant("Plan the wellbeing action plan for the user"),
    ];
    messages.extend_from_slice(tail(&history, HISTORY));

    let plan = ask(deps.chat.as_ref(), ADVICE_PLANNER, messages).await?;
    cycles += 1;

    match verdict(cycles, max_cycles(&state), history.last()) {
        Verdict::MaxCycles => ctx.log("[Planner] Max cycles reached."),
        Verdict::Approved => ctx.log("[Planner] Draft successfully generated!"),
        Verdict::NeedsReview => {}
    }

    Ok(json!({
        "messages": [Message::assistant(plan.clone()).with_name(PLANNER)],
        "plan": plan,
        "cycles_counter": cycles,
        "user_feedback": false
    }))
}

async fn feedback_generator(deps: Collaborators, state: Value, _ctx: NodeContext) -> Result<Value> {
    let history = conversation(&state)?;
    let mut messages = vec![Message::system(fill(
        prompts::REVIEWER,
        &[("problem", text(&state, "problem"))],
    ))];
    messages.extend_from_slice(tail(&history, HISTORY));

    let feedback = ask(deps.chat.as_ref(), FEEDBACK_GENERATOR, messages).await?;
    Ok(json!({ "messages": [Message::assistant(feedback).with_name(REVIEWER)] }))
}

async fn human_feedback(_deps: Collaborators, state: Value, ctx: NodeContext) -> Result<Value> {
    let prompt = fill(prompts::HUMAN_FEEDBACK, &[("plan", text(&state, "plan"))]);
    let answer = ctx.interrupt(Value::String(prompt))?;
    let answer = match answer {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    };
    ctx.log(format!("[User input] Feedback from the user: \"{}\"", answer));

    let answer = answer.trim();
    if answer.is_empty() || answer.eq_ignore_ascii_case(prompts::NO_FEEDBACK) {
        return Ok(json!({ "user_feedback": false }));
    }

    let message = Message::human(format!("My (user) feedback:\n\n{}", answer)).with_name(USER);
    Ok(json!({ "user_feedback": true, "messages": [message] }))
}

async fn plan_formatting(deps: Collaborators, state: Value, _ctx: NodeContext) -> Result<Value> {
    let plan: String = required(&state, PLAN_FORMATTING, "plan")?;
    let request = ChatRequest::new(vec![Message::system(prompts::FORMATTING), Message::assistant(plan)]);

    let formatted: Steps = structured_output(deps.chat.as_ref(), request, Steps::NAME, Steps::schema())
        .await
        .map_err(|e| node_failure(PLAN_FORMATTING, e))?;
    tracing::debug!(steps = formatted.steps.len(), "Plan formatted");

    Ok(json!({ "steps": formatted.steps }))
}

fn continue_planning(state: &Value) -> Route {
    let messages: Vec<Message> = serde_json::from_value(state["messages"].clone()).unwrap_or_default();
    let previous = messages.len().checked_sub(2).map(|i| &messages[i]);
    let cycles = state["cycles_counter"].as_i64().unwrap_or(0);

    match verdict(cycles, max_cycles(state), previous) {
        Verdict::MaxCycles | Verdict::Approved => Route::to(HUMAN_FEEDBACK),
        Verdict::NeedsReview => Route::to(FEEDBACK_GENERATOR),
    }
}

fn act_on_feedback(state: &Value) -> Route {
    if state["user_feedback"].as_bool().unwrap_or(false) {
        Route::to(ADVICE_PLANNER)
    } else {
        Route::to(PLAN_FORMATTING)
    }
}

/// Build the planning subgraph. It hands back `problem`, `steps` and
/// `max_cycles`.
pub fn build(deps: &Collaborators) -> Result<CompiledGraph> {
    let mut graph = StateGraph::new(schema());

    add_node_with(
        &mut graph,
        ADVICE_PLANNER,
        &["messages", "plan", "cycles_counter", "user_feedback"],
        deps,
        advice_planner,
    );
    add_node_with(&mut graph, FEEDBACK_GENERATOR, &["messages"], deps, feedback_generator);
    add_node_with(&mut graph, HUMAN_FEEDBACK, &["messages", "user_feedback"], deps, human_feedback);
    add_node_with(&mut graph, PLAN_FORMATTING, &["steps"], deps, plan_formatting);

    graph.add_edge(START, ADVICE_PLANNER);
    graph.add_conditional_edges(ADVICE_PLANNER, continue_planning, &[FEEDBACK_GENERATOR, HUMAN_FEEDBACK]);
    graph.add_edge(FEEDBACK_GENERATOR, ADVICE_PLANNER);
    graph.add_conditional_edges(HUMAN_FEEDBACK, act_on_feedback, &[ADVICE_PLANNER, PLAN_FORMATTING]);
    graph.add_edge(PLAN_FORMATTING, END);
    graph.with_output(&["problem", "steps", "max_cycles"]);

    graph.compile()
}
