//! Scoped thread acquisition
//!
//! [`with_thread`] creates a thread, runs the body and deletes the thread
//! exactly once, whether the body succeeded or not.

use std::future::Future;

use crate::error::Result;
use crate::service::{AgentService, ThreadId};

/// Run `body` on a fresh thread and release the thread afterwards.
///
/// If both the body and the release fail, the body's error is returned and
/// the release error is logged.
///
/// # Errors
///
/// Returns the thread creation error, the body's error, or the release error.
pub async fn with_thread<T, F, Fut>(service: &dyn AgentService, body: F) -> Result<T>
where
    F: FnOnce(ThreadId) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let thread = service.create_thread().await?;
    tracing::debug!(thread = %thread, "Acquired thread");

    let outcome = body(thread.clone()).await;
    let released = service.delete_thread(&thread).await;

    settle(outcome, released, "thread release")
}

/// Combine a body outcome with its cleanup outcome
pub(crate) fn settle<T>(outcome: Result<T>, cleanup: Result<()>, what: &str) -> Result<T> {
    match (outcome, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup_err)) => {
            tracing::warn!(error = %cleanup_err, "{} failed after an earlier error", what);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ColloquyError;
    use crate::service::ScriptedAgentService;

    #[tokio::test]
    async fn test_thread_released_on_success() {
        let service = ScriptedAgentService::new();
        let value = with_thread(&service, |thread| async move { Ok(thread) })
            .await
            .unwrap();

        assert_eq!(service.deletions_of(&value).await, 1);
        assert!(service.live_threads().await.is_empty());
    }

    #[tokio::test]
    async fn test_thread_released_on_failure() {
        let service = ScriptedAgentService::new();
        let result: Result<()> = with_thread(&service, |_thread| async move {
            Err(ColloquyError::Transport("connection reset".to_string()))
        })
        .await;

        assert!(matches!(result, Err(ColloquyError::Transport(_))));
        let created = service.created_threads().await;
        assert_eq!(created.len(), 1);
        assert_eq!(service.deletions_of(&created[0]).await, 1);
    }

    #[tokio::test]
    async fn test_body_error_wins_over_release_error() {
        let service = ScriptedAgentService::new().failing_thread_deletion();
        let result: Result<()> = with_thread(&service, |_thread| async move {
            Err(ColloquyError::Chat("body".to_string()))
        })
        .await;
        assert!(matches!(result, Err(ColloquyError::Chat(_))));
    }

    #[tokio::test]
    async fn test_release_error_surfaces_after_success() {
        let service = ScriptedAgentService::new().failing_thread_deletion();
        let result = with_thread(&service, |_thread| async move { Ok(42) }).await;
        assert!(matches!(result, Err(ColloquyError::Transport(_))));
    }

    #[tokio::test]
    async fn test_creation_failure_runs_nothing() {
        let service = ScriptedAgentService::new().failing_thread_creation();
        let mut ran = false;
        let result = with_thread(&service, |_thread| {
            ran = true;
            async move { Ok(()) }
        })
        .await;
        assert!(result.is_err());
        assert!(!ran);
        assert!(service.deleted_threads().await.is_empty());
    }
}
