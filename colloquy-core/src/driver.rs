//! Conversation Driver
//!
//! Sequences agent interactions for the two supported workflows:
//!
//! - **Hand-off**: one agent answers the seed task on a private thread, and
//!   its answer becomes the task of a two-agent group chat.
//! - **Group chat**: all agents share one group chat on the seed task.
//!
//! Every thread the driver causes to exist is released before the driver
//! returns, on success and on failure alike.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::agent::{ChatAgent, HostedAgent};
use crate::config::{AgentIds, ChatConfig};
use crate::error::Result;
use crate::group_chat::{AgentGroupChat, ChatOutcome};
use crate::message::ChatMessage;
use crate::service::AgentService;
use crate::task::Task;
use crate::termination::ApprovalTerminationStrategy;
use crate::thread::{settle, with_thread};
use crate::transcript::Transcript;

/// What a run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Reply of the hand-off agent (hand-off runs only)
    pub research: Option<ChatMessage>,
    /// Task the group chat was seeded with
    pub group_task: Task,
    /// Group chat messages, in order
    pub messages: Vec<ChatMessage>,
    pub outcome: ChatOutcome,
}

impl RunReport {
    pub fn approved(&self) -> bool {
        matches!(self.outcome, ChatOutcome::Approved { .. })
    }
}

/// The three remote agents of the built-in scenarios
#[derive(Clone)]
pub struct ScenarioAgents {
    pub web_search: Arc<dyn ChatAgent>,
    pub blog_writer: Arc<dyn ChatAgent>,
    pub blog_critique: Arc<dyn ChatAgent>,
}

impl ScenarioAgents {
    /// Resolve all three agents by their configured IDs.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a missing ID, or the lookup error.
    pub async fn fetch(service: Arc<dyn AgentService>, ids: &AgentIds) -> Result<Self> {
        let web_search = HostedAgent::fetch(service.clone(), ids.require("web_search")?).await?;
        let blog_writer = HostedAgent::fetch(service.clone(), ids.require("blog_writer")?).await?;
        let blog_critique = HostedAgent::fetch(service, ids.require("blog_critique")?).await?;

        Ok(Self {
            web_search: Arc::new(web_search),
            blog_writer: Arc::new(blog_writer),
            blog_critique: Arc::new(blog_critique),
        })
    }

    /// All three agents in speaking order
    pub fn all(&self) -> Vec<Arc<dyn ChatAgent>> {
        vec![
            self.web_search.clone(),
            self.blog_writer.clone(),
            self.blog_critique.clone(),
        ]
    }
}

/// Drives hand-off and group chat runs against an agent service
pub struct ConversationDriver {
    service: Arc<dyn AgentService>,
    chat: ChatConfig,
}

impl ConversationDriver {
    pub fn new(service: Arc<dyn AgentService>, chat: ChatConfig) -> Self {
        Self { service, chat }
    }

    pub fn chat_config(&self) -> &ChatConfig {
        &self.chat
    }

    fn termination(&self) -> ApprovalTerminationStrategy {
        ApprovalTerminationStrategy::new()
            .with_token(self.chat.approval_token.clone())
            .with_maximum_iterations(self.chat.maximum_iterations)
            .with_agents(self.chat.approvers.iter().cloned())
    }

    fn group_chat(&self, agents: Vec<Arc<dyn ChatAgent>>) -> Result<AgentGroupChat> {
        AgentGroupChat::builder(self.service.clone())
            .agents(agents)
            .termination(self.termination())
            .build()
    }

    /// Ask `research` the seed task on a private thread, then let `writer`
    /// and `critique` work on a blog task built from the answer.
    ///
    /// # Errors
    ///
    /// Returns the first service or transcript error, after releasing every
    /// thread created so far.
    pub async fn run_handoff(
        &self,
        task: &Task,
        research: Arc<dyn ChatAgent>,
        writer: Arc<dyn ChatAgent>,
        critique: Arc<dyn ChatAgent>,
        transcript: &mut dyn Transcript,
    ) -> Result<RunReport> {
        tracing::info!(agent = research.name(), task = %task, "Starting hand-off");
        transcript.seed(task)?;

        let text = task.as_str().to_owned();
        let agent = research.clone();
        let reply = with_thread(self.service.as_ref(), |thread| async move {
            agent.add_chat_message(&thread, &text).await?;
            agent.get_response(&thread).await
        })
        .await?;
        transcript.reply(&reply)?;

        let group_task = Task::compose_blog(&reply);
        tracing::info!(
            writer = writer.name(),
            critique = critique.name(),
            "Handing off to group chat"
        );

        let mut chat = self.group_chat(vec![writer, critique])?;
        let (messages, outcome) = drive(&mut chat, &group_task, transcript).await?;

        Ok(RunReport {
            research: Some(reply),
            group_task,
            messages,
            outcome,
        })
    }

    /// Let all `agents` work on the seed task in one group chat.
    ///
    /// # Errors
    ///
    /// Returns the first service or transcript error, after releasing the
    /// group chat thread.
    pub async fn run_group_chat(
        &self,
        task: &Task,
        agents: Vec<Arc<dyn ChatAgent>>,
        transcript: &mut dyn Transcript,
    ) -> Result<RunReport> {
        tracing::info!(agents = agents.len(), task = %task, "Starting group chat");
        transcript.seed(task)?;

        let mut chat = self.group_chat(agents)?;
        let (messages, outcome) = drive(&mut chat, task, transcript).await?;

        Ok(RunReport {
            research: None,
            group_task: task.clone(),
            messages,
            outcome,
        })
    }
}

/// Seed and run a group chat, then reset it whatever happened
async fn drive(
    chat: &mut AgentGroupChat,
    task: &Task,
    transcript: &mut dyn Transcript,
) -> Result<(Vec<ChatMessage>, ChatOutcome)> {
    let outcome = converse(chat, task, transcript).await;
    let released = chat.reset().await;
    settle(outcome, released, "group chat reset")
}

async fn converse(
    chat: &mut AgentGroupChat,
    task: &Task,
    transcript: &mut dyn Transcript,
) -> Result<(Vec<ChatMessage>, ChatOutcome)> {
    chat.add_chat_message(task.as_str()).await?;

    let mut messages = Vec::new();
    {
        let stream = chat.invoke()?;
        futures::pin_mut!(stream);
        while let Some(message) = stream.next().await {
            let message = message?;
            transcript.group_message(&message)?;
            messages.push(message);
        }
    }

    let outcome = chat
        .outcome()
        .cloned()
        .unwrap_or(ChatOutcome::IterationLimit {
            iterations: chat.iterations(),
        });
    tracing::info!(messages = messages.len(), outcome = ?outcome, "Group chat finished");
    Ok((messages, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{ScriptedAgentService, ScriptedReply};
    use crate::transcript::MemoryTranscript;

    #[tokio::test]
    async fn test_scenario_agents_fetch_requires_all_ids() {
        let service: Arc<dyn AgentService> = Arc::new(
            ScriptedAgentService::new().with_agent("s", "WebSearch", [ScriptedReply::text("x")]),
        );
        let ids = AgentIds {
            web_search: Some("s".to_string()),
            ..Default::default()
        };
        assert!(ScenarioAgents::fetch(service, &ids).await.is_err());
    }

    #[tokio::test]
    async fn test_termination_follows_config() {
        let service: Arc<dyn AgentService> = Arc::new(
            ScriptedAgentService::new()
                .with_agent("w", "BlogWriter", [ScriptedReply::text("ship it?")])
                .with_agent("c", "BlogCritique", [ScriptedReply::text("LGTM")]),
        );
        let writer: Arc<dyn ChatAgent> =
            Arc::new(HostedAgent::fetch(service.clone(), "w").await.unwrap());
        let critique: Arc<dyn ChatAgent> =
            Arc::new(HostedAgent::fetch(service.clone(), "c").await.unwrap());

        let driver = ConversationDriver::new(
            service,
            ChatConfig {
                maximum_iterations: 6,
                approval_token: "lgtm".to_string(),
                approvers: vec!["BlogCritique".to_string()],
            },
        );
        let mut transcript = MemoryTranscript::new();
        let report = driver
            .run_group_chat(&Task::new("t"), vec![writer, critique], &mut transcript)
            .await
            .unwrap();

        assert!(report.approved());
        assert_eq!(report.messages.len(), 2);
        assert_eq!(transcript.lines().len(), 3);
    }
}
