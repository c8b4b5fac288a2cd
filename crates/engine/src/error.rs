use taskforge_core::error::CoreError;
use taskforge_core::store::StoreError;

/// Errors surfaced to callers of the orchestrator.
///
/// Handler failures never appear here; callers observe those only through
/// `Task::status` and `Task::error_message`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Validation failures and unknown task ids.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The task store could not serve the request.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience alias for orchestrator return values.
pub type EngineResult<T> = Result<T, EngineError>;
