//! Configuration types for Colloquy

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ColloquyError, Result};
use crate::termination::{APPROVAL_TOKEN, DEFAULT_MAXIMUM_ITERATIONS};

/// Default agent service REST API version
pub const DEFAULT_API_VERSION: &str = "2025-05-01";

/// Main configuration for Colloquy
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ColloquyConfig {
    /// Hosted agent service connection
    pub service: ServiceConfig,

    /// Remote agent IDs used by the built-in scenarios
    pub agents: AgentIds,

    /// Group chat termination settings
    pub chat: ChatConfig,
}

/// Agent service connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Project endpoint, e.g. `https://<resource>.services.ai.azure.com/api/projects/<project>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// REST API version sent with every request
    pub api_version: String,

    /// Delay between run status polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl ServiceConfig {
    /// The endpoint with any trailing slash removed
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no endpoint is set.
    pub fn require_endpoint(&self) -> Result<&str> {
        self.endpoint
            .as_deref()
            .map(|e| e.trim_end_matches('/'))
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                ColloquyError::Configuration(
                    "agent service endpoint not set (service.endpoint or AZURE_AI_AGENT_ENDPOINT)"
                        .to_string(),
                )
            })
    }
}

/// Opaque IDs of the pre-created remote agents
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgentIds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub blog_writer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub blog_critique: Option<String>,
}

impl AgentIds {
    /// Look up a required agent ID by its role label
    pub fn require(&self, role: &str) -> Result<&str> {
        let id = match role {
            "web_search" => self.web_search.as_deref(),
            "blog_writer" => self.blog_writer.as_deref(),
            "blog_critique" => self.blog_critique.as_deref(),
            _ => None,
        };
        id.filter(|id| !id.is_empty()).ok_or_else(|| {
            ColloquyError::Configuration(format!("agent ID for '{}' not configured", role))
        })
    }
}

/// Group chat termination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum agent turns per group chat invocation
    pub maximum_iterations: usize,

    /// Case-insensitive token that ends the chat
    pub approval_token: String,

    /// Agent names whose turns are checked for approval (empty = every agent)
    pub approvers: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            maximum_iterations: DEFAULT_MAXIMUM_ITERATIONS,
            approval_token: APPROVAL_TOKEN.to_string(),
            approvers: Vec::new(),
        }
    }
}

/// Builder for ColloquyConfig
pub struct ConfigBuilder {
    config: ColloquyConfig,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: ColloquyConfig::default(),
        }
    }

    /// Set the service endpoint
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.service.endpoint = Some(endpoint.into());
        self
    }

    /// Set service configuration
    pub fn service(mut self, config: ServiceConfig) -> Self {
        self.config.service = config;
        self
    }

    /// Set agent IDs
    pub fn agents(mut self, agents: AgentIds) -> Self {
        self.config.agents = agents;
        self
    }

    /// Set chat configuration
    pub fn chat(mut self, config: ChatConfig) -> Self {
        self.config.chat = config;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ColloquyConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ColloquyConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. Configuration file (colloquy.toml)
    /// 3. `COLLOQUY_` environment variables (`__` separates sections)
    /// 4. Configuration file from COLLOQUY_CONFIG_PATH
    /// 5. Well-known service variables (AZURE_AI_AGENT_ENDPOINT, AZURE_AI_AGENT_API_VERSION)
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source is invalid.
    pub fn load() -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Toml},
        };

        let mut figment = Figment::new()
            .merge(Toml::file("colloquy.toml"))
            .merge(Env::prefixed("COLLOQUY_").split("__"));

        if let Ok(path) = std::env::var("COLLOQUY_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let mut config: ColloquyConfig = figment.extract().map_err(|e| {
            ColloquyError::Configuration(format!("Failed to load configuration: {}", e))
        })?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Toml},
        };

        let config: ColloquyConfig = Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                ColloquyError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var("AZURE_AI_AGENT_ENDPOINT") {
            self.service.endpoint = Some(endpoint);
        }
        if let Ok(version) = std::env::var("AZURE_AI_AGENT_API_VERSION") {
            self.service.api_version = version;
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.chat.maximum_iterations == 0 {
            return Err(ColloquyError::Configuration(
                "chat.maximum_iterations must be at least 1".to_string(),
            ));
        }

        if self.chat.approval_token.trim().is_empty() {
            return Err(ColloquyError::Configuration(
                "chat.approval_token must not be empty".to_string(),
            ));
        }

        if let Some(endpoint) = &self.service.endpoint
            && !(endpoint.starts_with("https://") || endpoint.starts_with("http://"))
        {
            return Err(ColloquyError::Configuration(format!(
                "service.endpoint must be an http(s) URL: {}",
                endpoint
            )));
        }

        Ok(())
    }
}
