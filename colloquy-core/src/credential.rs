//! Ambient credential resolution for the hosted agent service
//!
//! Credentials come from the environment the process runs in. Sources are
//! tried in order by [`DefaultCredential`]:
//!
//! 1. [`EnvironmentCredential`]: `AZURE_AI_AGENT_TOKEN` or `AZURE_AI_AGENT_API_KEY`
//! 2. [`AzureCliCredential`]: a token from a logged-in `az` CLI

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

use crate::error::{ColloquyError, Result};

/// Token audience for the agent service
pub const AGENT_SERVICE_RESOURCE: &str = "https://ai.azure.com";

const TOKEN_ENV: &str = "AZURE_AI_AGENT_TOKEN";
const API_KEY_ENV: &str = "AZURE_AI_AGENT_API_KEY";

/// A resolved credential
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Sent as `Authorization: Bearer <token>`
    Bearer(String),
    /// Sent as `api-key: <key>`
    ApiKey(String),
}

impl Credential {
    /// Header name and value carrying this credential
    pub fn header(&self) -> (&'static str, String) {
        match self {
            Credential::Bearer(token) => ("Authorization", format!("Bearer {}", token)),
            Credential::ApiKey(key) => ("api-key", key.clone()),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Bearer(_) => f.write_str("Credential::Bearer([REDACTED])"),
            Credential::ApiKey(_) => f.write_str("Credential::ApiKey([REDACTED])"),
        }
    }
}

/// Something that can produce a credential
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Short name used in logs and error messages
    fn name(&self) -> &str;

    /// Resolve a credential
    async fn get_credential(&self) -> Result<Credential>;
}

/// Reads a token or API key from environment variables
#[derive(Debug, Default)]
pub struct EnvironmentCredential;

#[async_trait]
impl CredentialSource for EnvironmentCredential {
    fn name(&self) -> &str {
        "environment"
    }

    async fn get_credential(&self) -> Result<Credential> {
        if let Some(token) = non_empty_var(TOKEN_ENV) {
            return Ok(Credential::Bearer(token));
        }
        if let Some(key) = non_empty_var(API_KEY_ENV) {
            return Ok(Credential::ApiKey(key));
        }
        Err(ColloquyError::Authentication(format!(
            "neither {} nor {} is set",
            TOKEN_ENV, API_KEY_ENV
        )))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Requests an access token from the Azure CLI
#[derive(Debug)]
pub struct AzureCliCredential {
    program: String,
    resource: String,
}

impl AzureCliCredential {
    pub fn new() -> Self {
        Self {
            program: "az".to_string(),
            resource: AGENT_SERVICE_RESOURCE.to_string(),
        }
    }

    /// Use a different CLI executable
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
}

fn parse_cli_token(stdout: &[u8]) -> Result<Credential> {
    let token: CliToken = serde_json::from_slice(stdout).map_err(|e| {
        ColloquyError::Authentication(format!("unexpected az CLI output: {}", e))
    })?;
    Ok(Credential::Bearer(token.access_token))
}

#[async_trait]
impl CredentialSource for AzureCliCredential {
    fn name(&self) -> &str {
        "azure-cli"
    }

    async fn get_credential(&self) -> Result<Credential> {
        let output = tokio::process::Command::new(&self.program)
            .args([
                "account",
                "get-access-token",
                "--resource",
                &self.resource,
                "--output",
                "json",
            ])
            .output()
            .await
            .map_err(|e| {
                ColloquyError::Authentication(format!("failed to run {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ColloquyError::Authentication(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        parse_cli_token(&output.stdout)
    }
}

/// Tries each source in order and returns the first credential obtained
pub struct DefaultCredential {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl DefaultCredential {
    /// Environment first, then the Azure CLI
    pub fn new() -> Self {
        Self {
            sources: vec![
                Box::new(EnvironmentCredential),
                Box::new(AzureCliCredential::new()),
            ],
        }
    }

    /// Use an explicit source chain
    pub fn with_sources(sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self { sources }
    }
}

impl Default for DefaultCredential {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialSource for DefaultCredential {
    fn name(&self) -> &str {
        "default"
    }

    async fn get_credential(&self) -> Result<Credential> {
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.get_credential().await {
                Ok(credential) => {
                    tracing::debug!(source = source.name(), "Resolved credential");
                    return Ok(credential);
                }
                Err(e) => {
                    tracing::debug!(source = source.name(), error = %e, "Credential source failed");
                    failures.push(format!("{}: {}", source.name(), e));
                }
            }
        }
        Err(ColloquyError::Authentication(if failures.is_empty() {
            "no credential sources configured".to_string()
        } else {
            failures.join("; ")
        }))
    }
}

/// Resolve the ambient credential with the default source chain
pub async fn authenticate() -> Result<Credential> {
    DefaultCredential::new().get_credential().await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Option<Credential>);

    #[async_trait]
    impl CredentialSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn get_credential(&self) -> Result<Credential> {
            self.0
                .clone()
                .ok_or_else(|| ColloquyError::Authentication("empty".to_string()))
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credential = Credential::Bearer("super-secret".to_string());
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_headers() {
        let (name, value) = Credential::Bearer("t".to_string()).header();
        assert_eq!(name, "Authorization");
        assert_eq!(value, "Bearer t");

        let (name, value) = Credential::ApiKey("k".to_string()).header();
        assert_eq!(name, "api-key");
        assert_eq!(value, "k");
    }

    #[test]
    fn test_parse_cli_token() {
        let stdout = br#"{"accessToken":"abc","expiresOn":"2026-01-01 00:00:00.000000","tokenType":"Bearer"}"#;
        assert_eq!(
            parse_cli_token(stdout).unwrap(),
            Credential::Bearer("abc".to_string())
        );
        assert!(parse_cli_token(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_chain_returns_first_success() {
        let chain = DefaultCredential::with_sources(vec![
            Box::new(FixedSource(None)),
            Box::new(FixedSource(Some(Credential::ApiKey("second".to_string())))),
            Box::new(FixedSource(Some(Credential::ApiKey("third".to_string())))),
        ]);
        assert_eq!(
            chain.get_credential().await.unwrap(),
            Credential::ApiKey("second".to_string())
        );
    }

    #[tokio::test]
    async fn test_chain_reports_every_failure() {
        let chain = DefaultCredential::with_sources(vec![
            Box::new(FixedSource(None)),
            Box::new(AzureCliCredential::new().with_program("colloquy-missing-az-binary")),
        ]);
        let err = chain.get_credential().await.unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, ColloquyError::Authentication(_)));
        assert!(message.contains("fixed"));
        assert!(message.contains("azure-cli"));
    }
}
