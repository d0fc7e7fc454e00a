//! Agent service client over the hosted agents REST API

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::credential::Credential;
use crate::error::{ColloquyError, Result};
use crate::message::{AuthorRole, ChatMessage};

use super::{AgentDefinition, AgentService, ThreadId};

/// Client for a hosted agent project endpoint
pub struct AzureAgentService {
    client: reqwest::Client,
    endpoint: String,
    api_version: String,
    poll_interval: Duration,
    credential: Credential,
}

impl AzureAgentService {
    /// Create a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no endpoint is configured.
    pub fn new(config: &ServiceConfig, credential: Credential) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: config.require_endpoint()?.to_string(),
            api_version: config.api_version.clone(),
            poll_interval: config.poll_interval,
            credential,
        })
    }

    /// Get the endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let (header, value) = self.credential.header();
        self.client
            .request(method, self.url(path))
            .query(&[("api-version", self.api_version.as_str())])
            .header(header, value)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| ColloquyError::Transport(format!("Failed to reach agent service: {}", e)))?;

        let response = check_status(response).await?;
        response.json::<T>().await.map_err(|e| {
            ColloquyError::Transport(format!("Failed to parse agent service response: {}", e))
        })
    }

    async fn create_run(&self, thread: &ThreadId, agent_id: &str) -> Result<RunObject> {
        let request = self
            .request(
                reqwest::Method::POST,
                &format!("threads/{}/runs", thread.as_str()),
            )
            .json(&CreateRun {
                assistant_id: agent_id,
            });
        self.send(request).await
    }

    async fn get_run(&self, thread: &ThreadId, run_id: &str) -> Result<RunObject> {
        self.send(self.request(
            reqwest::Method::GET,
            &format!("threads/{}/runs/{}", thread.as_str(), run_id),
        ))
        .await
    }

    async fn wait_for_run(&self, thread: &ThreadId, mut run: RunObject) -> Result<RunObject> {
        while !run.status.is_terminal() {
            tokio::time::sleep(self.poll_interval).await;
            run = self.get_run(thread, &run.id).await?;
            tracing::debug!(run_id = %run.id, status = ?run.status, "Polled run");
        }
        Ok(run)
    }

    async fn run_messages(&self, thread: &ThreadId, run_id: &str) -> Result<Vec<MessageObject>> {
        let request = self
            .request(
                reqwest::Method::GET,
                &format!("threads/{}/messages", thread.as_str()),
            )
            .query(&[("run_id", run_id), ("order", "asc")]);
        let page: ListResponse<MessageObject> = self.send(request).await?;
        Ok(page.data)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    Err(ColloquyError::Service {
        status: status.as_u16(),
        message: error_message(&text),
    })
}

/// Prefer the service's structured error message over the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| match e.error.code {
            Some(code) => format!("{}: {}", code, e.error.message),
            None => e.error.message,
        })
        .unwrap_or_else(|_| body.to_string())
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

#[derive(Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateRun<'a> {
    assistant_id: &'a str,
}

#[derive(Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
}

impl RunStatus {
    fn is_terminal(self) -> bool {
        !matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: RunStatus,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl RunObject {
    fn into_result(self) -> Result<()> {
        match self.status {
            RunStatus::Completed => Ok(()),
            RunStatus::RequiresAction => Err(ColloquyError::RunFailed {
                run_id: self.id,
                status: self.status.as_str().to_string(),
                message: "agent requested tool outputs, which are not supported".to_string(),
            }),
            status => {
                let message = self
                    .last_error
                    .map(|e| match (e.code, e.message) {
                        (Some(code), Some(message)) => format!("{}: {}", code, message),
                        (None, Some(message)) => message,
                        (Some(code), None) => code,
                        (None, None) => "no error details".to_string(),
                    })
                    .unwrap_or_else(|| "no error details".to_string());
                Err(ColloquyError::RunFailed {
                    run_id: self.id,
                    status: status.as_str().to_string(),
                    message,
                })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    id: String,
    role: AuthorRole,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessageContent {
    Text {
        text: TextContent,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    value: String,
}

impl MessageObject {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                MessageContent::Text { text } => Some(text.value.as_str()),
                MessageContent::Unsupported => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }
}

/// Fold a run's assistant messages into a single reply
fn reply_from_messages(
    agent: &AgentDefinition,
    run_id: &str,
    messages: &[MessageObject],
) -> Result<ChatMessage> {
    let replies: Vec<&MessageObject> = messages
        .iter()
        .filter(|m| m.role == AuthorRole::Assistant)
        .collect();

    let last = replies.last().ok_or_else(|| ColloquyError::RunFailed {
        run_id: run_id.to_string(),
        status: RunStatus::Completed.as_str().to_string(),
        message: "run completed without an assistant message".to_string(),
    })?;

    let content = replies
        .iter()
        .map(|m| m.text())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let mut reply = ChatMessage::agent(agent.display_name(), content).with_id(last.id.clone());
    if let Some(created_at) = last.created_at() {
        reply = reply.with_created_at(created_at);
    }
    Ok(reply)
}

#[async_trait]
impl AgentService for AzureAgentService {
    async fn get_agent(&self, agent_id: &str) -> Result<AgentDefinition> {
        let request = self.request(reqwest::Method::GET, &format!("assistants/{}", agent_id));
        match self.send(request).await {
            Err(ColloquyError::Service { status: 404, .. }) => {
                Err(ColloquyError::AgentNotFound(agent_id.to_string()))
            }
            other => other,
        }
    }

    async fn create_thread(&self) -> Result<ThreadId> {
        let request = self
            .request(reqwest::Method::POST, "threads")
            .json(&serde_json::json!({}));
        let thread: ThreadObject = self.send(request).await?;
        tracing::debug!(thread = %thread.id, "Created thread");
        Ok(ThreadId::new(thread.id))
    }

    async fn delete_thread(&self, thread: &ThreadId) -> Result<()> {
        let request = self.request(
            reqwest::Method::DELETE,
            &format!("threads/{}", thread.as_str()),
        );
        let _: serde_json::Value = self.send(request).await?;
        tracing::debug!(thread = %thread, "Deleted thread");
        Ok(())
    }

    async fn add_message(
        &self,
        thread: &ThreadId,
        role: AuthorRole,
        content: &str,
    ) -> Result<ChatMessage> {
        let request = self
            .request(
                reqwest::Method::POST,
                &format!("threads/{}/messages", thread.as_str()),
            )
            .json(&CreateMessage {
                role: role.as_str(),
                content,
            });
        let created: MessageObject = self.send(request).await?;

        let mut message = ChatMessage::user(content).with_id(created.id.clone());
        message.role = role;
        if let Some(created_at) = created.created_at() {
            message = message.with_created_at(created_at);
        }
        Ok(message)
    }

    async fn run_agent(&self, thread: &ThreadId, agent: &AgentDefinition) -> Result<ChatMessage> {
        let run = self.create_run(thread, &agent.id).await?;
        tracing::debug!(run_id = %run.id, agent = agent.display_name(), thread = %thread, "Started run");

        let run = self.wait_for_run(thread, run).await?;
        let run_id = run.id.clone();
        run.into_result()?;

        let messages = self.run_messages(thread, &run_id).await?;
        reply_from_messages(agent, &run_id, &messages)
    }
}
