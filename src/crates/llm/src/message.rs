//! Chat messages
//!
//! Messages are plain serde types so applications can keep a conversation in
//! workflow state and hand it back to a model unchanged.

use serde::{Deserialize, Serialize};

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Human,
    Assistant,
}

impl MessageRole {
    /// Label used when rendering a transcript.
    pub fn label(&self) -> &'static str {
        match self {
            MessageRole::System => "System",
            MessageRole::Human => "Human",
            MessageRole::Assistant => "AI",
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,

    /// Speaker name within a role, e.g. `"practitioner"` vs `"client"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Human, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether this message was written by the named speaker.
    pub fn is_from(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }
}

/// Render messages as `Speaker: content` lines, one message per line.
///
/// The speaker is the message name when set, otherwise the role label.
pub fn buffer_string(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let speaker = m.name.as_deref().unwrap_or_else(|| m.role.label());
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
