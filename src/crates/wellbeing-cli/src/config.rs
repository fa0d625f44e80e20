//! Application configuration
//!
//! Credentials and model choices come from the environment. Every required
//! variable is checked up front so a missing key fails before any graph runs.

use crate::error::{AppError, Result};
use llm::{RemoteLlmConfig, OPENAI_BASE_URL};

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const TAVILY_API_KEY: &str = "TAVILY_API_KEY";
pub const OPENAI_BASE_URL_VAR: &str = "OPENAI_BASE_URL";
pub const CHAT_MODEL_VAR: &str = "WELLBEING_CHAT_MODEL";
pub const FAST_MODEL_VAR: &str = "WELLBEING_FAST_MODEL";

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-2024-11-20";
pub const DEFAULT_FAST_MODEL: &str = "gpt-4.1-mini-2025-04-14";

const REQUIRED: [&str; 2] = [OPENAI_API_KEY, TAVILY_API_KEY];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub tavily_api_key: String,
    pub openai_base_url: String,
    /// Planning, consultation and writing
    pub chat_model: String,
    /// Conversation summaries
    pub fast_model: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let missing: Vec<String> = REQUIRED
            .iter()
            .filter(|name| get(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::MissingEnv(missing));
        }

        let openai_base_url = get(OPENAI_BASE_URL_VAR).unwrap_or_else(|| OPENAI_BASE_URL.to_string());
        if !(openai_base_url.starts_with("http://") || openai_base_url.starts_with("https://")) {
            return Err(AppError::Config(format!(
                "{} must be an http(s) URL, got '{}'",
                OPENAI_BASE_URL_VAR, openai_base_url
            )));
        }

        Ok(Self {
            openai_api_key: get(OPENAI_API_KEY).unwrap_or_default(),
            tavily_api_key: get(TAVILY_API_KEY).unwrap_or_default(),
            openai_base_url: openai_base_url.trim_end_matches('/').to_string(),
            chat_model: get(CHAT_MODEL_VAR).unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            fast_model: get(FAST_MODEL_VAR).unwrap_or_else(|| DEFAULT_FAST_MODEL.to_string()),
        })
    }

    /// Provider config for the main chat model, at temperature 0.
    pub fn chat_llm(&self) -> RemoteLlmConfig {
        RemoteLlmConfig::new(&self.openai_api_key, &self.openai_base_url, &self.chat_model)
            .with_temperature(0.0)
    }

    /// Provider config for the summarisation model, at temperature 0.
    pub fn fast_llm(&self) -> RemoteLlmConfig {
        self.chat_llm().with_model(&self.fast_model)
    }
}
