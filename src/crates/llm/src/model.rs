//! Chat model abstraction
//!
//! [`ChatModel`] is the only seam between workflow nodes and a provider.
//! Nodes hold an `Arc<dyn ChatModel>`, so tests swap in scripted fakes and the
//! binary wires in [`OpenAiClient`](crate::remote::OpenAiClient).

use crate::error::{LlmError, Result};
use crate::message::Message;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shape the model is asked to answer in
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// A JSON document matching `schema` (JSON Schema, object at the root)
    JsonSchema { name: String, schema: Value },
}

/// A chat completion request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub response_format: ResponseFormat,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
            response_format: ResponseFormat::Text,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Ask for a JSON answer matching `schema`.
    pub fn with_json_schema(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.response_format = ResponseFormat::JsonSchema {
            name: name.into(),
            schema,
        };
        self
    }
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl UsageMetadata {
    pub fn new(input_tokens: usize, output_tokens: usize) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// A chat completion
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub message: Message,
    pub usage: Option<UsageMetadata>,
    pub model: Option<String>,
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            usage: None,
            model: None,
            finish_reason: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.message.content
    }
}

/// Provider-agnostic chat model.
///
/// Implementations must be `Send + Sync`; nodes share one instance across
/// concurrent fan-out branches.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a complete response for the request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}

/// Run `request` in JSON mode and deserialize the answer into `T`.
pub async fn structured_output<T: DeserializeOwned>(
    model: &dyn ChatModel,
    request: ChatRequest,
    name: &str,
    schema: Value,
) -> Result<T> {
    let response = model.chat(request.with_json_schema(name, schema)).await?;
    parse_json_content(response.text())
}

/// Deserialize a model answer, tolerating a surrounding markdown code fence.
pub fn parse_json_content<T: DeserializeOwned>(content: &str) -> Result<T> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(body.trim()).map_err(|e| {
        LlmError::InvalidResponse(format!("expected JSON matching the requested schema: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Replies with a fixed text and records the requests it saw.
    struct FixedModel {
        reply: String,
        seen: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatModel for FixedModel {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
            self.seen.lock().unwrap().push(request);
            Ok(ChatResponse::new(Message::assistant(self.reply.clone())))
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Query {
        search_query: String,
    }

    #[tokio::test]
    async fn test_structured_output_sets_schema() {
        let model = Arc::new(FixedModel {
            reply: r#"{"search_query": "open office noise"}"#.to_string(),
            seen: Mutex::new(Vec::new()),
        });

        let schema = json!({"type": "object", "properties": {"search_query": {"type": "string"}}});
        let query: Query = structured_output(
            model.as_ref(),
            ChatRequest::new(vec![Message::human("question")]),
            "search_query",
            schema.clone(),
        )
        .await
        .unwrap();

        assert_eq!(query.search_query, "open office noise");
        let seen = model.seen.lock().unwrap();
        assert_eq!(
            seen[0].response_format,
            ResponseFormat::JsonSchema {
                name: "search_query".to_string(),
                schema
            }
        );
    }

    #[test]
    fn test_parse_json_content_with_fence() {
        let parsed: Query =
            parse_json_content("```json\n{\"search_query\": \"sleep hygiene\"}\n```").unwrap();
        assert_eq!(parsed.search_query, "sleep hygiene");
    }

    #[test]
    fn test_parse_json_content_rejects_prose() {
        let err = parse_json_content::<Query>("Sure! Here is your query.").unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[test]
    fn test_usage_total() {
        let usage = UsageMetadata::new(10, 5);
        assert_eq!(usage.total_tokens, 15);
    }
}
