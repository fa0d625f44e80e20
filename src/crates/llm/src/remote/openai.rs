//! OpenAI client implementation.
//!
//! Talks to the `/chat/completions` endpoint of OpenAI or any compatible
//! provider (set `base_url`). JSON-schema requests map onto the provider's
//! structured outputs (`response_format.type = "json_schema"`).
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::remote::OpenAiClient;
//! use llm::{ChatModel, ChatRequest, Message, RemoteLlmConfig, OPENAI_BASE_URL};
//!
//! let config = RemoteLlmConfig::from_env("OPENAI_API_KEY", OPENAI_BASE_URL, "gpt-4o")?;
//! let client = OpenAiClient::new(config)?;
//!
//! let request = ChatRequest::new(vec![Message::human("Hello!")]);
//! let response = client.chat(request).await?;
//! ```

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::message::{Message, MessageRole};
use crate::model::{ChatModel, ChatRequest, ChatResponse, ResponseFormat, UsageMetadata};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// OpenAI API client.
#[derive(Clone)]
pub struct OpenAiClient {
    config: RemoteLlmConfig,
    client: Client,
}

impl OpenAiClient {
    /// Create a new OpenAI client with the given configuration.
    pub fn new(config: RemoteLlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &RemoteLlmConfig {
        &self.config
    }

    /// Convert a message to OpenAI message format.
    fn convert_message(&self, msg: &Message) -> OpenAiMessage {
        OpenAiMessage {
            role: match msg.role {
                MessageRole::System => "system".to_string(),
                MessageRole::Human => "user".to_string(),
                MessageRole::Assistant => "assistant".to_string(),
            },
            content: Some(msg.content.clone()),
            name: msg.name.clone(),
        }
    }

    fn build_request(&self, request: &ChatRequest) -> OpenAiRequest {
        let response_format = match &request.response_format {
            ResponseFormat::Text => None,
            ResponseFormat::JsonSchema { name, schema } => Some(json!({
                "type": "json_schema",
                "json_schema": { "name": name, "schema": schema, "strict": true }
            })),
        };

        OpenAiRequest {
            model: self.config.model.clone(),
            messages: request.messages.iter().map(|m| self.convert_message(m)).collect(),
            temperature: request.temperature.or(self.config.temperature),
            max_tokens: request.max_tokens,
            response_format,
            stream: false,
        }
    }

    /// Convert an OpenAI response to a ChatResponse.
    fn convert_response(&self, openai_resp: OpenAiResponse) -> Result<ChatResponse> {
        let choice = openai_resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

        if let Some(refusal) = choice.message.refusal {
            return Err(LlmError::InvalidResponse(format!("model refused: {}", refusal)));
        }

        Ok(ChatResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            usage: openai_resp
                .usage
                .map(|u| UsageMetadata::new(u.prompt_tokens, u.completion_tokens)),
            model: Some(openai_resp.model),
            finish_reason: choice.finish_reason,
        })
    }

    async fn send_once(&self, body: &OpenAiRequest) -> Result<OpenAiResponse> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut req = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body);

        if let Some(org) = &self.config.organization {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, error_text));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

fn classify_status(status: StatusCode, body: String) -> LlmError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthenticationError(body),
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimitExceeded(body),
        s if s.is_server_error() => LlmError::ServiceUnavailable(format!("{}: {}", s, body)),
        s => LlmError::ProviderError(format!("OpenAI API error {}: {}", s, body)),
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 * 2u64.pow(attempt.min(6)))
}

#[async_trait]
impl ChatModel for OpenAiClient {
    #[tracing::instrument(skip(self, request), fields(model = %self.config.model, messages = request.messages.len()))]
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let body = self.build_request(&request);

        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(resp) => return self.convert_response(resp),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = backoff(attempt);
                    tracing::warn!(error = %e, attempt, ?delay, "Chat request failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}
