//! # Colloquy - Multi-Agent Conversations on Hosted Agents
//!
//! Colloquy drives conversations between agents that live on a hosted agent
//! service. The service does all reasoning and language generation; Colloquy
//! decides who speaks when, and when to stop:
//! - Agent lookup by opaque ID and a shared [`agent::ChatAgent`] capability
//! - Scoped threads that are always released
//! - Round-robin group chats bounded by a termination strategy
//! - A hand-off workflow feeding one agent's answer into a group chat
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use colloquy_core::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ColloquyConfig::load()?;
//!     let credential = authenticate().await?;
//!     let service: Arc<dyn AgentService> =
//!         Arc::new(AzureAgentService::new(&config.service, credential)?);
//!
//!     let agents = ScenarioAgents::fetch(service.clone(), &config.agents).await?;
//!     let driver = ConversationDriver::new(service, config.chat.clone());
//!
//!     let report = driver
//!         .run_group_chat(&Task::new(SKY_TASK), agents.all(), &mut WriterTranscript::stdout())
//!         .await?;
//!     println!("approved: {}", report.approved());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Service**: [`service::AgentService`] abstracts agent lookup, threads and runs
//! - **Credentials**: ambient credential chain (environment, Azure CLI)
//! - **Group chat**: selection and termination strategies over one shared thread
//! - **Driver**: hand-off and group chat workflows with guaranteed cleanup

pub mod agent;
pub mod config;
pub mod credential;
pub mod driver;
pub mod error;
pub mod group_chat;
pub mod message;
pub mod service;
pub mod task;
pub mod termination;
pub mod thread;
pub mod transcript;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::agent::{ChatAgent, HostedAgent};
    pub use crate::config::{AgentIds, ChatConfig, ColloquyConfig, ConfigBuilder, ServiceConfig};
    pub use crate::credential::{
        AzureCliCredential, Credential, CredentialSource, DefaultCredential,
        EnvironmentCredential, authenticate,
    };
    pub use crate::driver::{ConversationDriver, RunReport, ScenarioAgents};
    pub use crate::error::{ColloquyError, Result};
    pub use crate::group_chat::{
        AgentGroupChat, AgentGroupChatBuilder, ChatOutcome, SelectionStrategy,
        SequentialSelection,
    };
    pub use crate::message::{AuthorRole, ChatMessage};
    pub use crate::service::{
        AgentDefinition, AgentService, AzureAgentService, ScriptedAgentService, ScriptedReply,
        ThreadId,
    };
    pub use crate::task::{OCEAN_TASK, SKY_TASK, Task};
    pub use crate::termination::{
        APPROVAL_TOKEN, ApprovalTerminationStrategy, DEFAULT_MAXIMUM_ITERATIONS,
        TerminationStrategy, contains_approval,
    };
    pub use crate::thread::with_thread;
    pub use crate::transcript::{MemoryTranscript, Transcript, WriterTranscript};
}
