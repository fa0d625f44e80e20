//! Remote chat model providers.
//!
//! - **OpenAI** - OpenAI and OpenAI-compatible chat completion APIs

pub mod openai;

pub use openai::OpenAiClient;
