//! Task type to handler mapping.
//!
//! Handlers are registered before or after the engine starts; the lookup
//! happens per dequeued task, so late registrations take effect for every
//! task not yet picked up.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use taskforge_core::types::{Payload, TaskId};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Executes one task type.
///
/// Returning `Err` records a failed attempt; the error's display text
/// (with its cause chain) becomes the task's `error_message`.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, ctx: TaskContext, payload: Payload) -> anyhow::Result<Payload>;
}

/// Adapter that lets a plain async closure act as a [`TaskHandler`].
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskContext, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Payload>> + Send + 'static,
{
    async fn handle(&self, ctx: TaskContext, payload: Payload) -> anyhow::Result<Payload> {
        (self.f)(ctx, payload).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn TaskHandler>
where
    F: Fn(TaskContext, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Payload>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Per-execution information handed to a handler.
///
/// The token fires when the task is cancelled or the engine shuts down.
/// Handlers that check it can stop early; handlers that ignore it are
/// aborted at their next await point.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: TaskId,
    session_id: String,
    task_type: String,
    attempt: u32,
    token: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(
        task_id: TaskId,
        session_id: String,
        task_type: String,
        attempt: u32,
        token: CancellationToken,
    ) -> Self {
        Self {
            task_id,
            session_id,
            task_type,
            attempt,
            token,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    /// Zero-based attempt number (equals the task's `retry_count`).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the task is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// A handler plus its optional per-type timeout.
#[derive(Clone)]
pub struct RegisteredHandler {
    pub handler: Arc<dyn TaskHandler>,
    /// Overrides the pool-wide timeout when set.
    pub timeout: Option<Duration>,
}

/// Thread-safe handler registry.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, RegisteredHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; a later registration for the same type wins.
    pub async fn register(&self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.insert(task_type.into(), handler, None).await;
    }

    /// Register a handler with its own execution timeout.
    pub async fn register_with_timeout(
        &self,
        task_type: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
        timeout: Duration,
    ) {
        self.insert(task_type.into(), handler, Some(timeout)).await;
    }

    async fn insert(
        &self,
        task_type: String,
        handler: Arc<dyn TaskHandler>,
        timeout: Option<Duration>,
    ) {
        let replaced = self
            .handlers
            .write()
            .await
            .insert(task_type.clone(), RegisteredHandler { handler, timeout })
            .is_some();
        tracing::debug!(%task_type, replaced, ?timeout, "Handler registered");
    }

    pub async fn resolve(&self, task_type: &str) -> Option<RegisteredHandler> {
        self.handlers.read().await.get(task_type).cloned()
    }

    /// Registered task types, sorted.
    pub async fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TaskContext {
        TaskContext::new(
            uuid::Uuid::now_v7(),
            "s1".to_string(),
            "echo".to_string(),
            0,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn resolve_unknown_type_is_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.resolve("missing").await.is_none());
    }

    #[tokio::test]
    async fn later_registration_wins() {
        let registry = HandlerRegistry::new();
        registry
            .register(
                "greet",
                handler_fn(|_, _| async {
                    let mut out = Payload::new();
                    out.insert("v".into(), serde_json::json!(1));
                    Ok(out)
                }),
            )
            .await;
        registry
            .register_with_timeout(
                "greet",
                handler_fn(|_, _| async {
                    let mut out = Payload::new();
                    out.insert("v".into(), serde_json::json!(2));
                    Ok(out)
                }),
                Duration::from_secs(3),
            )
            .await;

        let registered = registry.resolve("greet").await.unwrap();
        assert_eq!(registered.timeout, Some(Duration::from_secs(3)));
        let out = registered.handler.handle(ctx(), Payload::new()).await.unwrap();
        assert_eq!(out["v"], 2);
        assert_eq!(registry.task_types().await, vec!["greet".to_string()]);
    }

    #[tokio::test]
    async fn context_reports_cancellation() {
        let context = ctx();
        assert!(!context.is_cancelled());
        context.token().cancel();
        assert!(context.is_cancelled());
        context.cancelled().await;
    }
}
