//! Chat model abstraction and providers.
//!
//! Workflow nodes talk to language models through the [`ChatModel`] trait.
//! This crate provides the trait, the message and request types, and an
//! OpenAI-compatible HTTP client.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use llm::remote::OpenAiClient;
//! use llm::{ChatModel, ChatRequest, Message, RemoteLlmConfig, OPENAI_BASE_URL};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RemoteLlmConfig::from_env("OPENAI_API_KEY", OPENAI_BASE_URL, "gpt-4o")?
//!         .with_temperature(0.0);
//!     let client = OpenAiClient::new(config)?;
//!
//!     let request = ChatRequest::new(vec![
//!         Message::system("You are a wellbeing advisor."),
//!         Message::human("How can I sleep better?"),
//!     ]);
//!
//!     let response = client.chat(request).await?;
//!     println!("{}", response.text());
//!     Ok(())
//! }
//! ```
//!
//! Structured answers go through [`structured_output`], which requests JSON
//! matching a schema and deserializes it.

pub mod config;
pub mod error;
pub mod message;
pub mod model;
pub mod remote;

pub use config::{RemoteLlmConfig, OPENAI_BASE_URL};
pub use error::{LlmError, Result};
pub use message::{buffer_string, Message, MessageRole};
pub use model::{
    parse_json_content, structured_output, ChatModel, ChatRequest, ChatResponse, ResponseFormat,
    UsageMetadata,
};
