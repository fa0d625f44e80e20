//! Application graphs
//!
//! - [`planning`]: drafts a plan with an AI reviewer, asks the user for
//!   feedback, and formats the approved plan into steps
//! - [`consultation`]: simulates a consultation about one step, backed by web
//!   and Wikipedia search, and writes a section of the final plan
//! - [`assistant`]: runs planning, fans out one consultation per step, and
//!   writes the final plan
//!
//! Conversations live in state as serialized [`Message`]s in an append field.

pub mod assistant;
pub mod consultation;
pub mod planning;

use crate::search::SearchProvider;
use llm::{ChatModel, ChatRequest, Message};
use serde::de::DeserializeOwned;
use serde_json::Value;
use stategraph_core::{GraphError, NodeContext, StateGraph};
use std::future::Future;
use std::sync::Arc;

use crate::error::node_failure;

/// External services the nodes call
#[derive(Clone)]
pub struct Collaborators {
    /// Planning, consultation and writing
    pub chat: Arc<dyn ChatModel>,
    /// Conversation summaries
    pub fast: Arc<dyn ChatModel>,
    pub web: Arc<dyn SearchProvider>,
    pub wiki: Arc<dyn SearchProvider>,
}

/// Add a node whose body receives its own handle on the collaborators.
pub(crate) fn add_node_with<F, Fut>(
    graph: &mut StateGraph,
    name: &str,
    writes: &[&str],
    deps: &Collaborators,
    body: F,
) where
    F: Fn(Collaborators, Value, NodeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, GraphError>> + Send + 'static,
{
    let deps = deps.clone();
    graph.add_node(name, writes, move |state, ctx| body(deps.clone(), state, ctx));
}

/// Ask `model` for a plain-text reply, reporting failures against `node`.
pub(crate) async fn ask(model: &dyn ChatModel, node: &str, messages: Vec<Message>) -> Result<String, GraphError> {
    let response = model
        .chat(ChatRequest::new(messages))
        .await
        .map_err(|e| node_failure(node, e))?;
    Ok(response.text().to_string())
}

/// The conversation visible to the models. Messages before `window_start`
/// have been folded into the summary.
pub(crate) fn conversation(state: &Value) -> Result<Vec<Message>, GraphError> {
    let mut messages: Vec<Message> = field(state, "messages")?.unwrap_or_default();
    let start = state["window_start"].as_u64().unwrap_or(0) as usize;
    Ok(messages.split_off(start.min(messages.len())))
}

/// The last `n` items.
pub(crate) fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

/// Deserialize an optional state field.
pub(crate) fn field<T: DeserializeOwned>(state: &Value, name: &str) -> Result<Option<T>, GraphError> {
    match state.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
    }
}

/// Deserialize a field the node cannot work without.
pub(crate) fn required<T: DeserializeOwned>(state: &Value, node: &str, name: &str) -> Result<T, GraphError> {
    field(state, name)?.ok_or_else(|| node_failure(node, format!("state field '{}' is not set", name)))
}

pub(crate) fn text<'a>(state: &'a Value, name: &str) -> &'a str {
    state[name].as_str().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversation_honours_window() {
        let state = json!({
            "messages": [
                {"role": "assistant", "content": "q1", "name": "client"},
                {"role": "assistant", "content": "a1", "name": "practitioner"},
                {"role": "assistant", "content": "q2", "name": "client"}
            ],
            "window_start": 2
        });
        let visible = conversation(&state).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].content, "q2");

        let all = conversation(&json!({"messages": []})).unwrap();
        assert!(all.is_empty());
    }

    #[test]
    fn test_window_past_the_end_is_empty() {
        let state = json!({"messages": [{"role": "human", "content": "hi"}], "window_start": 4});
        assert!(conversation(&state).unwrap().is_empty());
    }

    #[test]
    fn test_tail() {
        let messages: Vec<Message> = (0..7).map(|i| Message::human(i.to_string())).collect();
        assert_eq!(tail(&messages, 5).len(), 5);
        assert_eq!(tail(&messages, 5)[0].content, "2");
        assert_eq!(tail(&messages[..2], 5).len(), 2);
    }

    #[test]
    fn test_required_field() {
        let state = json!({"problem": "stress", "plan": null});
        let problem: String = required(&state, "n", "problem").unwrap();
        assert_eq!(problem, "stress");

        let err = required::<String>(&state, "plan_formatting", "plan").unwrap_err();
        assert!(err.to_string().contains("'plan'"));
    }
}
