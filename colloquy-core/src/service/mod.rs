//! Hosted agent service abstraction
//!
//! The service owns agent definitions, threads and runs. Everything in this
//! crate talks to it through [`AgentService`]; [`azure::AzureAgentService`]
//! is the HTTP implementation and [`scripted::ScriptedAgentService`] a
//! deterministic in-process one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::message::{AuthorRole, ChatMessage};

pub mod azure;
pub mod scripted;

pub use azure::AzureAgentService;
pub use scripted::{ScriptedAgentService, ScriptedReply};

/// Service-assigned thread identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A remote agent definition as stored by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Opaque agent ID
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Deployed model backing the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl AgentDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            description: None,
            model: None,
            instructions: None,
        }
    }

    /// Display name, falling back to the ID for unnamed agents
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.id)
    }
}

/// Operations the hosted agent service exposes
#[async_trait]
pub trait AgentService: Send + Sync {
    /// Fetch an agent definition by ID
    async fn get_agent(&self, agent_id: &str) -> Result<AgentDefinition>;

    /// Create an empty thread
    async fn create_thread(&self) -> Result<ThreadId>;

    /// Delete a thread and its messages
    async fn delete_thread(&self, thread: &ThreadId) -> Result<()>;

    /// Append a message to a thread
    async fn add_message(
        &self,
        thread: &ThreadId,
        role: AuthorRole,
        content: &str,
    ) -> Result<ChatMessage>;

    /// Run an agent on a thread and return its reply once the run completes
    async fn run_agent(&self, thread: &ThreadId, agent: &AgentDefinition) -> Result<ChatMessage>;
}
