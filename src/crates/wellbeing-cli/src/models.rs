//! Structured outputs requested from the chat model

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One step of a wellbeing action plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// A theme worth exploring for the reported problem, e.g. "Lifestyle changes"
    pub theme: String,
    /// One or two sentences of advice following the theme
    pub helpful_tip: String,
}

impl Step {
    pub fn summary(&self) -> String {
        format!("Theme: {}\n\nHelpful tip: {}", self.theme, self.helpful_tip)
    }

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "theme": {
                    "type": "string",
                    "description": "A theme which could be explored to improve the person's wellbeing in the context of their problem."
                },
                "helpful_tip": {
                    "type": "string",
                    "description": "A piece of advice which follows the theme."
                }
            },
            "required": ["theme", "helpful_tip"],
            "additionalProperties": false
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Steps {
    pub steps: Vec<Step>,
}

impl Steps {
    pub const NAME: &'static str = "steps";

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "steps": {
                    "type": "array",
                    "description": "Steps which could be taken to improve the user's wellbeing",
                    "items": Step::schema()
                }
            },
            "required": ["steps"],
            "additionalProperties": false
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub search_query: String,
}

impl SearchQuery {
    pub const NAME: &'static str = "search_query";

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "search_query": { "type": "string", "description": "Search query for retrieval." }
            },
            "required": ["search_query"],
            "additionalProperties": false
        })
    }
}
