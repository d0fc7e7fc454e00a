//! Deterministic in-process agent service
//!
//! Replays predetermined agent replies and records every thread it hands
//! out, enabling offline, deterministic runs of the conversation driver.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use crate::error::{ColloquyError, Result};
use crate::message::{AuthorRole, ChatMessage};

use super::{AgentDefinition, AgentService, ThreadId};

/// One predetermined agent turn
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    /// Reply with this text
    Text(String),
    /// Fail the run with this message
    Fail(String),
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedReply::Text(text.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        ScriptedReply::Fail(message.into())
    }
}

struct ScriptedAgent {
    definition: AgentDefinition,
    replies: VecDeque<ScriptedReply>,
    last: Option<ScriptedReply>,
}

impl ScriptedAgent {
    /// Next reply; the final reply repeats once the script runs out
    fn next_reply(&mut self) -> Option<ScriptedReply> {
        if let Some(reply) = self.replies.pop_front() {
            self.last = Some(reply.clone());
        }
        self.last.clone()
    }
}

#[derive(Default)]
struct State {
    agents: HashMap<String, ScriptedAgent>,
    threads: HashMap<ThreadId, Vec<ChatMessage>>,
    created: Vec<ThreadId>,
    deleted: Vec<ThreadId>,
    runs: usize,
    fail_create_thread: bool,
    fail_delete_thread: bool,
}

/// In-memory [`AgentService`] with scripted replies and thread accounting
#[derive(Default)]
pub struct ScriptedAgentService {
    state: Mutex<State>,
}

impl ScriptedAgentService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent and its replies, in turn order
    pub fn with_agent(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        replies: impl IntoIterator<Item = ScriptedReply>,
    ) -> Self {
        let definition = AgentDefinition::new(id, name);
        let mut state = self.state.into_inner();
        state.agents.insert(
            definition.id.clone(),
            ScriptedAgent {
                definition,
                replies: replies.into_iter().collect(),
                last: None,
            },
        );
        Self {
            state: Mutex::new(state),
        }
    }

    /// Make every `create_thread` call fail
    pub fn failing_thread_creation(self) -> Self {
        let mut state = self.state.into_inner();
        state.fail_create_thread = true;
        Self {
            state: Mutex::new(state),
        }
    }

    /// Make every `delete_thread` call fail (the thread is still counted as released)
    pub fn failing_thread_deletion(self) -> Self {
        let mut state = self.state.into_inner();
        state.fail_delete_thread = true;
        Self {
            state: Mutex::new(state),
        }
    }

    /// Threads created so far, in creation order
    pub async fn created_threads(&self) -> Vec<ThreadId> {
        self.state.lock().await.created.clone()
    }

    /// Delete calls so far, in call order
    pub async fn deleted_threads(&self) -> Vec<ThreadId> {
        self.state.lock().await.deleted.clone()
    }

    /// Number of delete calls made for one thread
    pub async fn deletions_of(&self, thread: &ThreadId) -> usize {
        self.state
            .lock()
            .await
            .deleted
            .iter()
            .filter(|t| *t == thread)
            .count()
    }

    /// Threads created but not yet deleted
    pub async fn live_threads(&self) -> Vec<ThreadId> {
        let state = self.state.lock().await;
        state
            .created
            .iter()
            .filter(|t| !state.deleted.contains(t))
            .cloned()
            .collect()
    }

    /// Messages currently stored on a live thread
    pub async fn thread_messages(&self, thread: &ThreadId) -> Option<Vec<ChatMessage>> {
        self.state.lock().await.threads.get(thread).cloned()
    }

    /// Total agent runs executed
    pub async fn run_count(&self) -> usize {
        self.state.lock().await.runs
    }
}

#[async_trait]
impl AgentService for ScriptedAgentService {
    async fn get_agent(&self, agent_id: &str) -> Result<AgentDefinition> {
        self.state
            .lock()
            .await
            .agents
            .get(agent_id)
            .map(|a| a.definition.clone())
            .ok_or_else(|| ColloquyError::AgentNotFound(agent_id.to_string()))
    }

    async fn create_thread(&self) -> Result<ThreadId> {
        let mut state = self.state.lock().await;
        if state.fail_create_thread {
            return Err(ColloquyError::Transport(
                "scripted thread creation failure".to_string(),
            ));
        }
        let thread = ThreadId::new(format!("thread_{}", uuid::Uuid::new_v4().simple()));
        state.threads.insert(thread.clone(), Vec::new());
        state.created.push(thread.clone());
        Ok(thread)
    }

    async fn delete_thread(&self, thread: &ThreadId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.deleted.push(thread.clone());
        if state.threads.remove(thread).is_none() {
            return Err(ColloquyError::Thread(format!("unknown thread {}", thread)));
        }
        if state.fail_delete_thread {
            return Err(ColloquyError::Transport(
                "scripted thread deletion failure".to_string(),
            ));
        }
        Ok(())
    }

    async fn add_message(
        &self,
        thread: &ThreadId,
        role: AuthorRole,
        content: &str,
    ) -> Result<ChatMessage> {
        let mut state = self.state.lock().await;
        let messages = state
            .threads
            .get_mut(thread)
            .ok_or_else(|| ColloquyError::Thread(format!("unknown thread {}", thread)))?;

        let mut message = ChatMessage::user(content).with_id(format!("msg_{}", messages.len()));
        message.role = role;
        messages.push(message.clone());
        Ok(message)
    }

    async fn run_agent(&self, thread: &ThreadId, agent: &AgentDefinition) -> Result<ChatMessage> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if !state.threads.contains_key(thread) {
            return Err(ColloquyError::Thread(format!("unknown thread {}", thread)));
        }

        let scripted = state
            .agents
            .get_mut(&agent.id)
            .ok_or_else(|| ColloquyError::AgentNotFound(agent.id.clone()))?;
        let reply = scripted.next_reply();
        state.runs += 1;
        let run_id = format!("run_{}", state.runs);

        match reply {
            Some(ScriptedReply::Text(text)) => {
                let messages = state
                    .threads
                    .get_mut(thread)
                    .ok_or_else(|| ColloquyError::Thread(format!("unknown thread {}", thread)))?;
                let message = ChatMessage::agent(agent.display_name(), text)
                    .with_id(format!("msg_{}", messages.len()));
                messages.push(message.clone());
                Ok(message)
            }
            Some(ScriptedReply::Fail(message)) => Err(ColloquyError::RunFailed {
                run_id,
                status: "failed".to_string(),
                message,
            }),
            None => Err(ColloquyError::RunFailed {
                run_id,
                status: "failed".to_string(),
                message: format!("no scripted reply for {}", agent.display_name()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ScriptedAgentService {
        ScriptedAgentService::new().with_agent(
            "asst_w",
            "BlogWriter",
            [ScriptedReply::text("draft 1"), ScriptedReply::text("draft 2")],
        )
    }

    #[tokio::test]
    async fn test_lookup() {
        let service = service();
        let def = service.get_agent("asst_w").await.unwrap();
        assert_eq!(def.display_name(), "BlogWriter");
        assert!(matches!(
            service.get_agent("asst_missing").await,
            Err(ColloquyError::AgentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_replies_in_order_then_repeat_last() {
        let service = service();
        let def = service.get_agent("asst_w").await.unwrap();
        let thread = service.create_thread().await.unwrap();

        let r1 = service.run_agent(&thread, &def).await.unwrap();
        let r2 = service.run_agent(&thread, &def).await.unwrap();
        let r3 = service.run_agent(&thread, &def).await.unwrap();
        assert_eq!(r1.content, "draft 1");
        assert_eq!(r2.content, "draft 2");
        assert_eq!(r3.content, "draft 2");
        assert_eq!(service.run_count().await, 3);
        assert_eq!(service.thread_messages(&thread).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_thread_accounting() {
        let service = service();
        let thread = service.create_thread().await.unwrap();
        service
            .add_message(&thread, AuthorRole::User, "hi")
            .await
            .unwrap();
        assert_eq!(service.live_threads().await, vec![thread.clone()]);

        service.delete_thread(&thread).await.unwrap();
        assert!(service.live_threads().await.is_empty());
        assert_eq!(service.deletions_of(&thread).await, 1);

        // Second release of the same thread is an error and is still recorded
        assert!(service.delete_thread(&thread).await.is_err());
        assert_eq!(service.deletions_of(&thread).await, 2);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let service = ScriptedAgentService::new().with_agent(
            "asst_s",
            "WebSearch",
            [ScriptedReply::fail("search backend down")],
        );
        let def = service.get_agent("asst_s").await.unwrap();
        let thread = service.create_thread().await.unwrap();
        let err = service.run_agent(&thread, &def).await.unwrap_err();
        assert!(err.to_string().contains("search backend down"));
    }
}
