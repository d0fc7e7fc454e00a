//! Group chat termination strategies
//!
//! A strategy answers two questions after every agent turn: should the chat
//! stop now, and how many turns may one invocation take at most. The ceiling
//! guarantees the chat ends even when the predicate never fires.

use crate::message::ChatMessage;

/// Token that marks a message as approving the work
pub const APPROVAL_TOKEN: &str = "approved";

/// Turn ceiling per group chat invocation
pub const DEFAULT_MAXIMUM_ITERATIONS: usize = 10;

/// Decides when a group chat stops
pub trait TerminationStrategy: Send + Sync {
    /// Upper bound on agent turns per invocation
    fn maximum_iterations(&self) -> usize;

    /// Names of the agents whose turns are evaluated (empty = every agent)
    fn agents(&self) -> &[String] {
        &[]
    }

    /// The predicate itself, evaluated over the history after a turn
    fn should_agent_terminate(&self, history: &[ChatMessage]) -> bool;

    /// Scope check followed by the predicate
    fn should_terminate(&self, agent_name: &str, history: &[ChatMessage]) -> bool {
        let scope = self.agents();
        if !scope.is_empty() && !scope.iter().any(|a| a == agent_name) {
            return false;
        }
        self.should_agent_terminate(history)
    }
}

/// Whether `text` contains `token`, ignoring case
pub fn contains_approval(text: &str, token: &str) -> bool {
    text.to_lowercase().contains(&token.to_lowercase())
}

/// Stops when the latest message contains the approval token
#[derive(Debug, Clone)]
pub struct ApprovalTerminationStrategy {
    token: String,
    maximum_iterations: usize,
    agents: Vec<String>,
}

impl ApprovalTerminationStrategy {
    /// `"approved"`, ten turns, every agent
    pub fn new() -> Self {
        Self {
            token: APPROVAL_TOKEN.to_string(),
            maximum_iterations: DEFAULT_MAXIMUM_ITERATIONS,
            agents: Vec::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Set the ceiling; at least one turn is always allowed
    pub fn with_maximum_iterations(mut self, maximum: usize) -> Self {
        self.maximum_iterations = maximum.max(1);
        self
    }

    /// Only evaluate turns taken by these agents
    pub fn with_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.agents = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// True iff the latest message's text contains the token in any case
    pub fn is_approval(&self, latest: &ChatMessage) -> bool {
        contains_approval(&latest.content, &self.token)
    }
}

impl Default for ApprovalTerminationStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminationStrategy for ApprovalTerminationStrategy {
    fn maximum_iterations(&self) -> usize {
        self.maximum_iterations
    }

    fn agents(&self) -> &[String] {
        &self.agents
    }

    fn should_agent_terminate(&self, history: &[ChatMessage]) -> bool {
        history.last().is_some_and(|latest| self.is_approval(latest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(texts: &[&str]) -> Vec<ChatMessage> {
        texts
            .iter()
            .map(|t| ChatMessage::agent("BlogCritique", *t))
            .collect()
    }

    #[test]
    fn test_approval_any_case() {
        let strategy = ApprovalTerminationStrategy::new();
        for text in [
            "approved",
            "Approved",
            "APPROVED",
            "This draft is approved.",
            "unapproved changes",
        ] {
            assert!(
                strategy.should_agent_terminate(&history(&[text])),
                "expected approval for {:?}",
                text
            );
        }
    }

    #[test]
    fn test_no_approval() {
        let strategy = ApprovalTerminationStrategy::new();
        for text in ["", "approve", "needs work", "appro ved", "APPROVE D"] {
            assert!(
                !strategy.should_agent_terminate(&history(&[text])),
                "unexpected approval for {:?}",
                text
            );
        }
    }

    #[test]
    fn test_empty_history_never_terminates() {
        assert!(!ApprovalTerminationStrategy::new().should_agent_terminate(&[]));
    }

    #[test]
    fn test_only_latest_message_counts() {
        let strategy = ApprovalTerminationStrategy::new();
        assert!(!strategy.should_agent_terminate(&history(&["Approved", "one more fix"])));
        assert!(strategy.should_agent_terminate(&history(&["draft", "revise", "APPROVED"])));
    }

    #[test]
    fn test_agent_scope() {
        let strategy = ApprovalTerminationStrategy::new().with_agents(["BlogCritique"]);
        let approved = history(&["approved"]);
        assert!(strategy.should_terminate("BlogCritique", &approved));
        assert!(!strategy.should_terminate("BlogWriter", &approved));

        let unscoped = ApprovalTerminationStrategy::new();
        assert!(unscoped.should_terminate("BlogWriter", &approved));
    }

    #[test]
    fn test_custom_token_and_ceiling() {
        let strategy = ApprovalTerminationStrategy::new()
            .with_token("LGTM")
            .with_maximum_iterations(0);
        assert_eq!(strategy.maximum_iterations(), 1);
        assert!(strategy.should_agent_terminate(&history(&["lgtm, ship it"])));
        assert!(!strategy.should_agent_terminate(&history(&["approved"])));
    }
}
