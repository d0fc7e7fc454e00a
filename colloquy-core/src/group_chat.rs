//! Agent Group Chat
//!
//! Several agents take turns on one shared service thread. A
//! [`SelectionStrategy`] picks the next speaker and a
//! [`TerminationStrategy`] decides when to stop.
//!
//! # Example
//!
//! ```rust,ignore
//! use colloquy_core::group_chat::AgentGroupChat;
//! use colloquy_core::termination::ApprovalTerminationStrategy;
//! use futures::StreamExt;
//!
//! let mut chat = AgentGroupChat::builder(service)
//!     .agent(writer)
//!     .agent(critique)
//!     .termination(ApprovalTerminationStrategy::new())
//!     .build()?;
//!
//! chat.add_chat_message("Write a post about tides").await?;
//! {
//!     let stream = chat.invoke()?;
//!     futures::pin_mut!(stream);
//!     while let Some(message) = stream.next().await {
//!         println!("{}", message?);
//!     }
//! }
//! chat.reset().await?;
//! ```

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::agent::ChatAgent;
use crate::error::{ColloquyError, Result};
use crate::message::ChatMessage;
use crate::service::{AgentService, ThreadId};
use crate::termination::{ApprovalTerminationStrategy, TerminationStrategy};

/// Picks which agent speaks next
pub trait SelectionStrategy: Send + Sync {
    /// Index into `agents` of the next speaker
    fn next(&mut self, agents: &[Arc<dyn ChatAgent>], history: &[ChatMessage]) -> Result<usize>;

    /// Forget any selection state
    fn reset(&mut self) {}
}

/// Round-robin over the agents in the order they were added
#[derive(Debug, Default)]
pub struct SequentialSelection {
    index: usize,
}

impl SequentialSelection {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStrategy for SequentialSelection {
    fn next(&mut self, agents: &[Arc<dyn ChatAgent>], _history: &[ChatMessage]) -> Result<usize> {
        if agents.is_empty() {
            return Err(ColloquyError::Chat("no agents to select from".to_string()));
        }
        let selected = self.index % agents.len();
        self.index = selected + 1;
        Ok(selected)
    }

    fn reset(&mut self) {
        self.index = 0;
    }
}

/// How a group chat invocation ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatOutcome {
    /// The termination predicate fired after this agent's turn
    Approved { by: String },
    /// The turn ceiling was reached first
    IterationLimit { iterations: usize },
}

/// Agents sharing one thread, speaking in turns
pub struct AgentGroupChat {
    service: Arc<dyn AgentService>,
    agents: Vec<Arc<dyn ChatAgent>>,
    selection: Box<dyn SelectionStrategy>,
    termination: Box<dyn TerminationStrategy>,
    history: Vec<ChatMessage>,
    thread: Option<ThreadId>,
    iterations: usize,
    outcome: Option<ChatOutcome>,
}

impl std::fmt::Debug for AgentGroupChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentGroupChat")
            .field(
                "agents",
                &self.agents.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .field("thread", &self.thread)
            .field("history_len", &self.history.len())
            .field("iterations", &self.iterations)
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl AgentGroupChat {
    /// Create a new group chat builder
    pub fn builder(service: Arc<dyn AgentService>) -> AgentGroupChatBuilder {
        AgentGroupChatBuilder::new(service)
    }

    pub fn agents(&self) -> &[Arc<dyn ChatAgent>] {
        &self.agents
    }

    /// Every message seen so far, seed messages included
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// The shared thread, once created
    pub fn thread(&self) -> Option<&ThreadId> {
        self.thread.as_ref()
    }

    /// Agent turns taken in the current invocation
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Whether the termination predicate has fired
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, Some(ChatOutcome::Approved { .. }))
    }

    /// How the last invocation ended, if it has ended
    pub fn outcome(&self) -> Option<&ChatOutcome> {
        self.outcome.as_ref()
    }

    async fn ensure_thread(&mut self) -> Result<ThreadId> {
        if let Some(thread) = &self.thread {
            return Ok(thread.clone());
        }
        let thread = self.service.create_thread().await?;
        tracing::debug!(thread = %thread, "Created group chat thread");
        self.thread = Some(thread.clone());
        Ok(thread)
    }

    /// Add a user message to the shared thread and the local history.
    ///
    /// # Errors
    ///
    /// Returns the service error if the thread cannot be created or written.
    pub async fn add_chat_message(&mut self, text: &str) -> Result<()> {
        let thread = self.ensure_thread().await?;
        let message = self
            .service
            .add_message(&thread, crate::message::AuthorRole::User, text)
            .await?;
        self.history.push(message);
        Ok(())
    }

    /// Take one agent turn.
    ///
    /// Returns `Ok(None)` once the chat is complete or the ceiling is reached.
    ///
    /// # Errors
    ///
    /// Returns the selection or service error of this turn.
    pub async fn next_message(&mut self) -> Result<Option<ChatMessage>> {
        if self.outcome.is_some() {
            return Ok(None);
        }

        let maximum = self.termination.maximum_iterations();
        if self.iterations >= maximum {
            self.outcome = Some(ChatOutcome::IterationLimit {
                iterations: self.iterations,
            });
            return Ok(None);
        }

        let thread = self.ensure_thread().await?;
        let index = self.selection.next(&self.agents, &self.history)?;
        let agent = Arc::clone(&self.agents[index]);

        self.iterations += 1;
        tracing::debug!(
            agent = agent.name(),
            iteration = self.iterations,
            maximum,
            "Group chat turn"
        );

        let message = agent.get_response(&thread).await?;
        self.history.push(message.clone());

        if self.termination.should_terminate(agent.name(), &self.history) {
            tracing::info!(agent = agent.name(), iteration = self.iterations, "Group chat approved");
            self.outcome = Some(ChatOutcome::Approved {
                by: agent.name().to_string(),
            });
        } else if self.iterations >= maximum {
            tracing::info!(iterations = self.iterations, "Group chat reached iteration limit");
            self.outcome = Some(ChatOutcome::IterationLimit {
                iterations: self.iterations,
            });
        }

        Ok(Some(message))
    }

    /// Start an invocation and return its messages as a lazy stream.
    ///
    /// The turn counter restarts with every invocation. The stream ends after
    /// the terminating message, at the ceiling, or right after yielding an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns a `Chat` error if the chat is already complete; call
    /// [`reset`](Self::reset) first.
    pub fn invoke(&mut self) -> Result<impl Stream<Item = Result<ChatMessage>> + '_> {
        if self.is_complete() {
            return Err(ColloquyError::Chat(
                "group chat is complete; reset it before invoking again".to_string(),
            ));
        }
        if self.agents.is_empty() {
            return Err(ColloquyError::Chat("group chat has no agents".to_string()));
        }

        self.iterations = 0;
        self.outcome = None;

        Ok(futures::stream::unfold(
            (self, false),
            |(chat, failed)| async move {
                if failed {
                    return None;
                }
                match chat.next_message().await {
                    Ok(Some(message)) => Some((Ok(message), (chat, false))),
                    Ok(None) => None,
                    Err(e) => Some((Err(e), (chat, true))),
                }
            },
        ))
    }

    /// Release the shared thread and clear all chat state.
    ///
    /// Local state is cleared even when the release fails, so the thread is
    /// never released twice.
    ///
    /// # Errors
    ///
    /// Returns the service error from deleting the thread.
    pub async fn reset(&mut self) -> Result<()> {
        self.history.clear();
        self.iterations = 0;
        self.outcome = None;
        self.selection.reset();

        match self.thread.take() {
            Some(thread) => {
                tracing::debug!(thread = %thread, "Releasing group chat thread");
                self.service.delete_thread(&thread).await
            }
            None => Ok(()),
        }
    }
}

/// Builder for AgentGroupChat
pub struct AgentGroupChatBuilder {
    service: Arc<dyn AgentService>,
    agents: Vec<Arc<dyn ChatAgent>>,
    selection: Box<dyn SelectionStrategy>,
    termination: Box<dyn TerminationStrategy>,
}

impl AgentGroupChatBuilder {
    /// Create a new builder with round-robin selection and approval termination
    pub fn new(service: Arc<dyn AgentService>) -> Self {
        Self {
            service,
            agents: Vec::new(),
            selection: Box::new(SequentialSelection::new()),
            termination: Box::new(ApprovalTerminationStrategy::new()),
        }
    }

    /// Add an agent; speaking order follows insertion order
    pub fn agent(mut self, agent: Arc<dyn ChatAgent>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Add several agents
    pub fn agents(mut self, agents: impl IntoIterator<Item = Arc<dyn ChatAgent>>) -> Self {
        self.agents.extend(agents);
        self
    }

    pub fn selection(mut self, selection: impl SelectionStrategy + 'static) -> Self {
        self.selection = Box::new(selection);
        self
    }

    pub fn termination(mut self, termination: impl TerminationStrategy + 'static) -> Self {
        self.termination = Box::new(termination);
        self
    }

    /// Build the group chat.
    ///
    /// # Errors
    ///
    /// Returns a `Chat` error if no agents were added.
    pub fn build(self) -> Result<AgentGroupChat> {
        if self.agents.is_empty() {
            return Err(ColloquyError::Chat(
                "a group chat needs at least one agent".to_string(),
            ));
        }
        Ok(AgentGroupChat {
            service: self.service,
            agents: self.agents,
            selection: self.selection,
            termination: self.termination,
            history: Vec::new(),
            thread: None,
            iterations: 0,
            outcome: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::HostedAgent;
    use crate::service::{ScriptedAgentService, ScriptedReply};
    use futures::StreamExt;

    async fn chat_with(
        service: Arc<ScriptedAgentService>,
        ids: &[&str],
        termination: ApprovalTerminationStrategy,
    ) -> AgentGroupChat {
        let dyn_service: Arc<dyn AgentService> = service;
        let mut builder = AgentGroupChat::builder(dyn_service.clone()).termination(termination);
        for id in ids {
            let agent = HostedAgent::fetch(dyn_service.clone(), id).await.unwrap();
            builder = builder.agent(Arc::new(agent));
        }
        builder.build().unwrap()
    }

    async fn collect(chat: &mut AgentGroupChat) -> Vec<Result<ChatMessage>> {
        let stream = chat.invoke().unwrap();
        futures::pin_mut!(stream);
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item);
        }
        out
    }

    fn writer_and_critique(critique: Vec<ScriptedReply>) -> Arc<ScriptedAgentService> {
        Arc::new(
            ScriptedAgentService::new()
                .with_agent("w", "BlogWriter", [ScriptedReply::text("draft")])
                .with_agent("c", "BlogCritique", critique),
        )
    }

    #[test]
    fn test_sequential_selection_round_robin() {
        struct Named(&'static str);

        #[async_trait::async_trait]
        impl ChatAgent for Named {
            fn id(&self) -> &str {
                self.0
            }
            fn name(&self) -> &str {
                self.0
            }
            async fn add_chat_message(&self, _: &ThreadId, _: &str) -> Result<()> {
                Ok(())
            }
            async fn get_response(&self, _: &ThreadId) -> Result<ChatMessage> {
                Ok(ChatMessage::agent(self.0, ""))
            }
        }

        let agents: Vec<Arc<dyn ChatAgent>> =
            vec![Arc::new(Named("a")), Arc::new(Named("b")), Arc::new(Named("c"))];
        let mut selection = SequentialSelection::new();
        let picks: Vec<usize> = (0..7).map(|_| selection.next(&agents, &[]).unwrap()).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);

        selection.reset();
        assert_eq!(selection.next(&agents, &[]).unwrap(), 0);
        assert!(selection.next(&[], &[]).is_err());
    }

    #[tokio::test]
    async fn test_stops_on_approval() {
        let service = writer_and_critique(vec![
            ScriptedReply::text("needs more detail"),
            ScriptedReply::text("Approved."),
        ]);
        let mut chat = chat_with(service.clone(), &["w", "c"], ApprovalTerminationStrategy::new()).await;

        chat.add_chat_message("Write about tides").await.unwrap();
        let messages: Vec<ChatMessage> = collect(&mut chat)
            .await
            .into_iter()
            .map(|m| m.unwrap())
            .collect();

        let authors: Vec<&str> = messages.iter().map(|m| m.author()).collect();
        assert_eq!(
            authors,
            vec!["BlogWriter", "BlogCritique", "BlogWriter", "BlogCritique"]
        );
        assert_eq!(messages.last().unwrap().content, "Approved.");
        assert!(chat.is_complete());
        assert_eq!(
            chat.outcome(),
            Some(&ChatOutcome::Approved {
                by: "BlogCritique".to_string()
            })
        );
        // seed + four turns
        assert_eq!(chat.history().len(), 5);
    }

    #[tokio::test]
    async fn test_ceiling_bounds_messages() {
        let service = writer_and_critique(vec![ScriptedReply::text("revise")]);
        let mut chat = chat_with(
            service,
            &["w", "c"],
            ApprovalTerminationStrategy::new().with_maximum_iterations(10),
        )
        .await;

        chat.add_chat_message("Write about tides").await.unwrap();
        let messages = collect(&mut chat).await;
        assert_eq!(messages.len(), 10);
        assert!(!chat.is_complete());
        assert_eq!(
            chat.outcome(),
            Some(&ChatOutcome::IterationLimit { iterations: 10 })
        );
    }

    #[tokio::test]
    async fn test_invoke_after_completion_requires_reset() {
        let service = writer_and_critique(vec![ScriptedReply::text("approved")]);
        let mut chat = chat_with(service.clone(), &["c"], ApprovalTerminationStrategy::new()).await;

        chat.add_chat_message("go").await.unwrap();
        assert_eq!(collect(&mut chat).await.len(), 1);
        assert!(matches!(chat.invoke().err(), Some(ColloquyError::Chat(_))));

        let thread = chat.thread().cloned().unwrap();
        chat.reset().await.unwrap();
        assert!(chat.history().is_empty());
        assert!(chat.thread().is_none());
        assert!(!chat.is_complete());
        assert_eq!(service.deletions_of(&thread).await, 1);

        // A second reset has nothing to release
        chat.reset().await.unwrap();
        assert_eq!(service.deletions_of(&thread).await, 1);
    }

    #[tokio::test]
    async fn test_stream_ends_after_error() {
        let service = writer_and_critique(vec![ScriptedReply::fail("model overloaded")]);
        let mut chat = chat_with(service.clone(), &["w", "c"], ApprovalTerminationStrategy::new()).await;

        chat.add_chat_message("Write").await.unwrap();
        let items = collect(&mut chat).await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(ColloquyError::RunFailed { .. })));

        chat.reset().await.unwrap();
        assert!(service.live_threads().await.is_empty());
    }

    #[tokio::test]
    async fn test_scoped_approval_ignores_other_agents() {
        let service = Arc::new(
            ScriptedAgentService::new()
                .with_agent("w", "BlogWriter", [ScriptedReply::text("I approved my own draft")])
                .with_agent(
                    "c",
                    "BlogCritique",
                    [ScriptedReply::text("tighten it"), ScriptedReply::text("APPROVED")],
                ),
        );
        let mut chat = chat_with(
            service,
            &["w", "c"],
            ApprovalTerminationStrategy::new().with_agents(["BlogCritique"]),
        )
        .await;

        chat.add_chat_message("Write").await.unwrap();
        let messages = collect(&mut chat).await;
        assert_eq!(messages.len(), 4);
        assert_eq!(
            chat.outcome(),
            Some(&ChatOutcome::Approved {
                by: "BlogCritique".to_string()
            })
        );
    }

    #[test]
    fn test_builder_requires_agents() {
        let service: Arc<dyn AgentService> = Arc::new(ScriptedAgentService::new());
        assert!(matches!(
            AgentGroupChat::builder(service).build(),
            Err(ColloquyError::Chat(_))
        ));
    }
}
