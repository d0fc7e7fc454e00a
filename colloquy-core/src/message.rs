//! Chat messages exchanged with hosted agents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorRole {
    User,
    /// Hosted agents report this role as `assistant`
    #[serde(alias = "agent")]
    Assistant,
}

impl AuthorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorRole::User => "user",
            AuthorRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for AuthorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message in a thread or group chat history.
///
/// Messages are immutable once built; the builder-style `with_*` methods
/// consume and return a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role
    pub role: AuthorRole,
    /// Display name of the authoring agent, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Text content
    pub content: String,
    /// Service-assigned message ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Service-side creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: AuthorRole::User,
            name: None,
            content: content.into(),
            id: None,
            created_at: None,
        }
    }

    /// Create a message authored by the named agent
    pub fn agent(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: AuthorRole::Assistant,
            name: Some(name.into()),
            content: content.into(),
            id: None,
            created_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Author name, or `*` when the message is anonymous
    pub fn author(&self) -> &str {
        self.name.as_deref().unwrap_or("*")
    }

    pub fn is_from(&self, agent_name: &str) -> bool {
        self.name.as_deref() == Some(agent_name)
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}
