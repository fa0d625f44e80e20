//! Consultation subgraph
//!
//! One instance runs per plan step. A simulated client asks about the step,
//! a practitioner answers from freshly retrieved documents, and the exchange
//! repeats until the client says goodbye or `max_cycles` answers were given.
//! The transcript is then written up as one section of the final plan.
//!
//! ```text
//! START -> question_generator -> [goodbye?] ---------------------> answer_generator
//!                                    |                                 ^
//!                                    +-> web_research  ---------------+
//!                                    +-> wiki_research ---------------+
//!
//! answer_generator -> save_transcript -> [done?] -> section_writer -> END
//!                                           |
//!                                           v
//!                                   generate_summary -> question_generator
//! ```
//!
//! Long conversations are summarised; summarised messages stay in state but
//! drop out of the visible window (`window_start`).

use super::{add_node_with, ask, conversation, required, tail, text, Collaborators};
use crate::error::node_failure;
use crate::models::{SearchQuery, Step};
use crate::prompts::{self, fill};
use crate::search::{format_documents, SearchProvider};
use llm::{buffer_string, structured_output, ChatModel, ChatRequest, Message};
use serde_json::{json, Value};
use stategraph_core::{CompiledGraph, NodeContext, Result, Route, StateGraph, StateSchema, END, START};

pub const QUESTION_GENERATOR: &str = "question_generator";
pub const WEB_RESEARCH: &str = "web_research";
pub const WIKI_RESEARCH: &str = "wiki_research";
pub const ANSWER_GENERATOR: &str = "answer_generator";
pub const SAVE_TRANSCRIPT: &str = "save_transcript";
pub const GENERATE_SUMMARY: &str = "generate_summary";
pub const SECTION_WRITER: &str = "section_writer";

pub const CLIENT: &str = "client";
pub const PRACTITIONER: &str = "practitioner";

/// Visible messages that trigger a summary
const SUMMARY_THRESHOLD: usize = 6;

/// Messages dropped from the window after a summary
const SUMMARISED: u64 = 4;

/// Retrieval results the practitioner answers from (web and wiki)
const CONTEXT_DOCS: usize = 2;

pub fn schema() -> StateSchema {
    StateSchema::new()
        .field("problem")
        .with_default("max_cycles", json!(2))
        .field("step")
        .field("webquery")
        .field("wikiquery")
        .with_default("transcript", json!(""))
        .with_default("summary", json!(""))
        .with_default("cycles_counter", json!(0))
        .append_field("source_docs")
        .field("sections")
        .append_field("messages")
        .with_default("window_start", json!(0))
}

fn greeting() -> Message {
    Message::assistant(prompts::GREETING).with_name(PRACTITIONER)
}

fn said_goodbye(message: Option<&Message>) -> bool {
    message.is_some_and(|m| m.content.contains(prompts::GOODBYE))
}

async fn question_generator(deps: Collaborators, state: Value, _ctx: NodeContext) -> Result<Value> {
    let step: Step = required(&state, QUESTION_GENERATOR, "step")?;
    let advice = step.summary();
    let instructions = fill(
        prompts::QUESTION,
        &[
            ("problem", text(&state, "problem")),
            ("advice", advice.as_str()),
            ("summary", text(&state, "summary")),
        ],
    );

    let mut messages = vec![Message::system(instructions), greeting()];
    messages.extend(conversation(&state)?);

    let question = ask(deps.chat.as_ref(), QUESTION_GENERATOR, messages).await?;
    Ok(json!({ "messages": [Message::assistant(question).with_name(CLIENT)] }))
}

/// Build a search query from the conversation, run it, and record the
/// formatted results.
async fn research(
    node: &str,
    template: &str,
    query_field: &str,
    model: &dyn ChatModel,
    provider: &dyn SearchProvider,
    state: &Value,
) -> Result<Value> {
    let instructions = fill(
        template,
        &[("problem", text(state, "problem")), ("summary", text(state, "summary"))],
    );
    let mut messages = vec![Message::system(instructions)];
    messages.extend(conversation(state)?);

    let query: SearchQuery = structured_output(model, ChatRequest::new(messages), SearchQuery::NAME, SearchQuery::schema())
        .await
        .map_err(|e| node_failure(node, e))?;

    let docs = provider
        .search(&query.search_query)
        .await
        .map_err(|e| node_failure(node, e))?;
    tracing::debug!(node, provider = provider.name(), results = docs.len(), "Retrieved documents");

    let mut update = json!({ "source_docs": [format_documents(&docs)] });
    update[query_field] = Value::String(query.search_query);
    Ok(update)
}

async fn web_research(deps: Collaborators, state: Value, _ctx: NodeContext) -> Result<Value> {
    research(WEB_RESEARCH, prompts::WEB_QUERY, "webquery", deps.chat.as_ref(), deps.web.as_ref(), &state).await
}

async fn wiki_research(deps: Collaborators, state: Value, _ctx: NodeContext) -> Result<Value> {
    research(WIKI_RESEARCH, prompts::WIKI_QUERY, "wikiquery", deps.chat.as_ref(), deps.wiki.as_ref(), &state).await
}

/// The most recent search results, as the answer's context.
fn answer_context(docs: &[String]) -> String {
    tail(docs, CONTEXT_DOCS).join("\n\n-----\n\n")
}

async fn answer_generator(deps: Collaborators, state: Value, _ctx: NodeContext) -> Result<Value> {
    let history = conversation(&state)?;
    let cycles = state["cycles_counter"].as_i64().unwrap_or(0) + 1;

    let answer = if said_goodbye(history.last()) {
        prompts::FAREWELL.to_string()
    } else {
        let docs: Vec<String> = super::field(&state, "source_docs")?.unwrap_or_default();
        let context = answer_context(&docs);
        let instructions = fill(
            prompts::ANSWER,
            &[
                ("problem", text(&state, "problem")),
                ("context", context.as_str()),
                ("summary", text(&state, "summary")),
            ],
        );

        let mut messages = vec![Message::system(instructions)];
        messages.extend(history);
        ask(deps.chat.as_ref(), ANSWER_GENERATOR, messages).await?
    };

    Ok(json!({
        "messages": [Message::assistant(answer).with_name(PRACTITIONER)],
        "cycles_counter": cycles
    }))
}

/// Add the latest exchange to the transcript. The first exchange also
/// records the greeting that opened the conversation.
fn extend_transcript(transcript: &str, history: Vec<Message>) -> String {
    let entries = if transcript.is_empty() {
        let mut opening = vec![greeting()];
        opening.extend(history);
        buffer_string(&opening)
    } else {
        buffer_string(tail(&history, 2))
    };
    format!("{}\n{}", transcript, entries)
}

async fn save_transcript(_deps: Collaborators, state: Value, _ctx: NodeContext) -> Result<Value> {
    let transcript = extend_transcript(text(&state, "transcript"), conversation(&state)?);
    Ok(json!({ "transcript": transcript }))
}

async fn generate_summary(deps: Collaborators, state: Value, _ctx: NodeContext) -> Result<Value> {
    let history = conversation(&state)?;
    if history.len() < SUMMARY_THRESHOLD {
        return Ok(Value::Null);
    }

    let mut messages = vec![Message::system(fill(
        prompts::SUMMARY,
        &[("summary", text(&state, "summary"))],
    ))];
    messages.extend(history);

    let summary = ask(deps.fast.as_ref(), GENERATE_SUMMARY, messages).await?;
    let window_start = state["window_start"].as_u64().unwrap_or(0) + SUMMARISED;
    Ok(json!({ "summary": summary, "window_start": window_start }))
}

async fn section_writer(deps: Collaborators, state: Value, ctx: NodeContext) -> Result<Value> {
    let step: Step = required(&state, SECTION_WRITER, "step")?;
    let summary = step.summary();
    let instructions = fill(
        prompts::SECTION_WRITER,
        &[("step", summary.as_str()), ("transcript", text(&state, "transcript"))],
    );
    let messages = vec![
        Message::system(instructions),
        Message::human(format!(
            "Write a section for my Wellbeing Action Plan, in the context of my problem: {}",
            text(&state, "problem")
        )),
    ];

    let section = ask(deps.chat.as_ref(), SECTION_WRITER, messages).await?;
    if !section.is_empty() {
        ctx.log(format!(
            "[Consultation] Section for theme '{}' successfully generated!",
            step.theme
        ));
    }
    Ok(json!({ "sections": [section] }))
}

fn skip_the_search(state: &Value) -> Route {
    let history = conversation(state).unwrap_or_default();
    if said_goodbye(history.last()) {
        Route::to(ANSWER_GENERATOR)
    } else {
        Route::many([WEB_RESEARCH, WIKI_RESEARCH])
    }
}

fn continue_consultation(state: &Value) -> Route {
    let history = conversation(state).unwrap_or_default();
    let cycles = state["cycles_counter"].as_i64().unwrap_or(0);
    let max_cycles = state["max_cycles"].as_i64().unwrap_or(2);
    let question = history.len().checked_sub(2).map(|i| &history[i]);

    if cycles >= max_cycles || said_goodbye(question) {
        Route::to(SECTION_WRITER)
    } else {
        Route::to(GENERATE_SUMMARY)
    }
}

/// Build the consultation subgraph. It hands back `sections` only.
pub fn build(deps: &Collaborators) -> Result<CompiledGraph> {
    let mut graph = StateGraph::new(schema());

    add_node_with(&mut graph, QUESTION_GENERATOR, &["messages"], deps, question_generator);
    add_node_with(&mut graph, WEB_RESEARCH, &["webquery", "source_docs"], deps, web_research);
    add_node_with(&mut graph, WIKI_RESEARCH, &["wikiquery", "source_docs"], deps, wiki_research);
    add_node_with(&mut graph, ANSWER_GENERATOR, &["messages", "cycles_counter"], deps, answer_generator);
    add_node_with(&mut graph, SAVE_TRANSCRIPT, &["transcript"], deps, save_transcript);
    add_node_with(&mut graph, GENERATE_SUMMARY, &["summary", "window_start"], deps, generate_summary);
    add_node_with(&mut graph, SECTION_WRITER, &["sections"], deps, section_writer);

    graph.add_edge(START, QUESTION_GENERATOR);
    graph.add_conditional_edges(
        QUESTION_GENERATOR,
        skip_the_search,
        &[ANSWER_GENERATOR, WEB_RESEARCH, WIKI_RESEARCH],
    );
    graph.add_edge(WEB_RESEARCH, ANSWER_GENERATOR);
    graph.add_edge(WIKI_RESEARCH, ANSWER_GENERATOR);
    graph.add_edge(ANSWER_GENERATOR, SAVE_TRANSCRIPT);
    graph.add_conditional_edges(SAVE_TRANSCRIPT, continue_consultation, &[GENERATE_SUMMARY, SECTION_WRITER]);
    graph.add_edge(GENERATE_SUMMARY, QUESTION_GENERATOR);
    graph.add_edge(SECTION_WRITER, END);
    graph.with_output(&["sections"]);

    graph.compile()
}
