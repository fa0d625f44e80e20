//! Retrieval providers
//!
//! The consultation graph searches the web (Tavily) and Wikipedia for context
//! before the practitioner answers. Both sit behind [`SearchProvider`] so
//! tests can script results.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

pub const TAVILY_URL: &str = "https://api.tavily.com/search";
pub const WIKIPEDIA_API_URL: &str = "https://en.wikipedia.org/w/api.php";

/// Documents requested per search
pub const MAX_RESULTS: usize = 2;

/// Characters kept from scraped page content or article text
pub const MAX_CONTENT_CHARS: usize = 1500;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search provider error {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Invalid search response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, SearchError>;

/// A retrieved document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub source: String,
    pub title: String,
    pub content: String,
}

impl Document {
    pub fn new(source: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            content: content.into(),
        }
    }

    /// Render as a tagged block the answer prompt can cite from.
    pub fn render(&self) -> String {
        format!(
            "<Document source: {}, title: \"{}\"/>\n{}\n</Document>",
            self.source, self.title, self.content
        )
    }
}

/// Join rendered documents with a separator line.
pub fn format_documents(docs: &[Document]) -> String {
    docs.iter()
        .map(Document::render)
        .collect::<Vec<_>>()
        .join("\n\n-----\n\n")
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Document>>;

    fn name(&self) -> &str;
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn http_client() -> Result<Client> {
    Ok(Client::builder().timeout(Duration::from_secs(30)).build()?)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(SearchError::Provider {
            status: status.as_u16(),
            body,
        })
    }
}

/// Tavily web search
#[derive(Clone)]
pub struct TavilySearch {
    api_key: String,
    endpoint: String,
    client: Client,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            endpoint: TAVILY_URL.to_string(),
            client: http_client()?,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn request_body(&self, query: &str) -> Value {
        json!({
            "query": query,
            "max_results": MAX_RESULTS,
            "topic": "general",
            "include_raw_content": true
        })
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    raw_content: Option<String>,
}

fn parse_tavily(body: Value) -> Result<Vec<Document>> {
    let response: TavilyResponse =
        serde_json::from_value(body).map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

    Ok(response
        .results
        .into_iter()
        .map(|r| {
            let raw = r.raw_content.as_deref().map(|raw| truncate(raw, MAX_CONTENT_CHARS)).unwrap_or("");
            Document::new(r.url, r.title, format!("{}\n\n{}", r.content, raw).trim_end().to_string())
        })
        .collect())
}

#[async_trait]
impl SearchProvider for TavilySearch {
    #[tracing::instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<Document>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(query))
            .send()
            .await?;

        let body: Value = check_status(response).await?.json().await?;
        let docs = parse_tavily(body)?;
        tracing::debug!(results = docs.len(), "Web search finished");
        Ok(docs)
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

/// Wikipedia article search through the MediaWiki action API
#[derive(Clone)]
pub struct WikipediaSearch {
    endpoint: String,
    client: Client,
}

impl WikipediaSearch {
    pub fn new() -> Result<Self> {
        Ok(Self {
            endpoint: WIKIPEDIA_API_URL.to_string(),
            client: http_client()?,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn query_params(query: &str) -> Vec<(&'static str, String)> {
        vec![
            ("action", "query".to_string()),
            ("format", "json".to_string()),
            ("generator", "search".to_string()),
            ("gsrsearch", query.to_string()),
            ("gsrlimit", MAX_RESULTS.to_string()),
            ("prop", "extracts|info".to_string()),
            ("inprop", "url".to_string()),
            ("explaintext", "1".to_string()),
            ("exlimit", MAX_RESULTS.to_string()),
        ]
    }
}

fn parse_wikipedia(body: Value) -> Result<Vec<Document>> {
    // No `query` key means no hits.
    let Some(pages) = body.pointer("/query/pages").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };

    let mut ranked: Vec<(i64, Document)> = pages
        .values()
        .map(|page| {
            let title = page["title"].as_str().unwrap_or_default();
            let url = page["fullurl"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| format!("https://en.wikipedia.org/wiki/{}", title.replace(' ', "_")));
            let extract = page["extract"].as_str().unwrap_or_default();
            let rank = page["index"].as_i64().unwrap_or(i64::MAX);
            (rank, Document::new(url, title, truncate(extract, MAX_CONTENT_CHARS)))
        })
        .collect();
    ranked.sort_by_key(|(rank, _)| *rank);

    Ok(ranked.into_iter().map(|(_, doc)| doc).collect())
}

#[async_trait]
impl SearchProvider for WikipediaSearch {
    #[tracing::instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<Document>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&Self::query_params(query))
            .header("User-Agent", concat!("wellbeing-cli/", env!("CARGO_PKG_VERSION")))
            .send()
            .await?;

        let body: Value = check_status(response).await?.json().await?;
        let docs = parse_wikipedia(body)?;
        tracing::debug!(results = docs.len(), "Wikipedia search finished");
        Ok(docs)
    }

    fn name(&self) -> &str {
        "wikipedia"
    }
}
