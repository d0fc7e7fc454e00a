//! Agent handles
//!
//! A [`ChatAgent`] is anything that can take a message on a thread and
//! answer on it. Group chats and the conversation driver only see this trait;
//! [`HostedAgent`] is the implementation backed by a remote agent definition.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::message::{AuthorRole, ChatMessage};
use crate::service::{AgentDefinition, AgentService, ThreadId};

/// Shared messaging capability of every agent
#[async_trait]
pub trait ChatAgent: Send + Sync {
    /// Opaque agent ID
    fn id(&self) -> &str;

    /// Display name used as message author
    fn name(&self) -> &str;

    /// Post a user message to a thread
    async fn add_chat_message(&self, thread: &ThreadId, text: &str) -> Result<()>;

    /// Produce this agent's next reply on a thread
    async fn get_response(&self, thread: &ThreadId) -> Result<ChatMessage>;
}

/// Agent backed by a definition stored on the agent service
#[derive(Clone)]
pub struct HostedAgent {
    definition: AgentDefinition,
    service: Arc<dyn AgentService>,
}

impl std::fmt::Debug for HostedAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedAgent")
            .field("definition", &self.definition)
            .finish()
    }
}

impl HostedAgent {
    /// Wrap an already fetched definition
    pub fn new(service: Arc<dyn AgentService>, definition: AgentDefinition) -> Self {
        Self {
            definition,
            service,
        }
    }

    /// Look up an agent definition by ID and wrap it.
    ///
    /// # Errors
    ///
    /// Returns `AgentNotFound` for an unknown ID, or the service error.
    pub async fn fetch(service: Arc<dyn AgentService>, agent_id: &str) -> Result<Self> {
        let definition = service.get_agent(agent_id).await?;
        tracing::info!(
            agent_id = %definition.id,
            agent = definition.display_name(),
            "Resolved agent definition"
        );
        Ok(Self::new(service, definition))
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }
}

#[async_trait]
impl ChatAgent for HostedAgent {
    fn id(&self) -> &str {
        &self.definition.id
    }

    fn name(&self) -> &str {
        self.definition.display_name()
    }

    async fn add_chat_message(&self, thread: &ThreadId, text: &str) -> Result<()> {
        self.service
            .add_message(thread, AuthorRole::User, text)
            .await?;
        Ok(())
    }

    async fn get_response(&self, thread: &ThreadId) -> Result<ChatMessage> {
        tracing::debug!(agent = self.name(), thread = %thread, "Requesting agent response");
        self.service.run_agent(thread, &self.definition).await
    }
}
