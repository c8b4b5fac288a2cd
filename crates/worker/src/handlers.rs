//! Handlers registered by the worker binary.

use taskforge_engine::{handler_fn, Orchestrator};

/// Task type of the demonstration handler.
pub const ECHO: &str = "echo";

pub async fn register_all(orchestrator: &Orchestrator) {
    // Returns its payload unchanged.
    orchestrator
        .register(
            ECHO,
            handler_fn(|ctx, payload| async move {
                tracing::debug!(task_id = %ctx.task_id(), keys = payload.len(), "Echo");
                Ok(payload)
            }),
        )
        .await;
}
