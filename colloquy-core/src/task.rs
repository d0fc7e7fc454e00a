//! Task seeds

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::ChatMessage;

/// Seed task of the hand-off scenario
pub const OCEAN_TASK: &str = "Why is the ocean blue?";

/// Seed task of the group chat scenario
pub const SKY_TASK: &str = "Why is the sky blue?";

/// An immutable natural-language instruction that starts a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Task(String);

impl Task {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self(instruction.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blog-writing task built from a research reply
    pub fn compose_blog(research: &ChatMessage) -> Self {
        Self(format!(
            "Create a concise blog post.\nUse this information from web search:\n{}",
            research.content
        ))
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Task {
    fn from(s: &str) -> Self {
        Task::new(s)
    }
}

impl From<String> for Task {
    fn from(s: String) -> Self {
        Task(s)
    }
}
