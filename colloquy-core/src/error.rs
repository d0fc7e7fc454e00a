//! Error types for Colloquy operations

/// Result type for Colloquy operations
pub type Result<T> = std::result::Result<T, ColloquyError>;

/// Error types for Colloquy
#[derive(Debug, thiserror::Error)]
pub enum ColloquyError {
    /// No credential source produced a usable credential
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Agent lookup by ID failed
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Thread lifecycle error (unknown thread, double release)
    #[error("Thread error: {0}")]
    Thread(String),

    /// The agent service answered with a non-success status
    #[error("Agent service error ({status}): {message}")]
    Service { status: u16, message: String },

    /// The request never produced a service response
    #[error("Transport error: {0}")]
    Transport(String),

    /// An agent run ended in a non-completed state
    #[error("Run {run_id} ended with status '{status}': {message}")]
    RunFailed {
        run_id: String,
        status: String,
        message: String,
    },

    /// Group chat used in an invalid state
    #[error("Chat error: {0}")]
    Chat(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl ColloquyError {
    /// Whether the error came from the remote service or the network path to it
    pub fn is_service_failure(&self) -> bool {
        matches!(
            self,
            ColloquyError::Service { .. }
                | ColloquyError::Transport(_)
                | ColloquyError::RunFailed { .. }
        )
    }
}

impl From<reqwest::Error> for ColloquyError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ColloquyError::Service {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => ColloquyError::Transport(err.to_string()),
        }
    }
}

impl From<String> for ColloquyError {
    fn from(s: String) -> Self {
        ColloquyError::Other(s)
    }
}

impl From<&str> for ColloquyError {
    fn from(s: &str) -> Self {
        ColloquyError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for ColloquyError {
    fn from(err: anyhow::Error) -> Self {
        ColloquyError::Other(err.to_string())
    }
}
