//! Asynchronous task orchestration engine.
//!
//! Callers submit typed units of work to an [`Orchestrator`]; a fixed pool
//! of workers executes them through registered [`TaskHandler`]s with
//! priority ordering, per-task timeouts, bounded retries with exponential
//! backoff and cooperative cancellation. Task state lives in a
//! [`taskforge_core::store::TaskStore`].

pub mod config;
pub mod error;
pub mod events;
pub mod janitor;
pub mod orchestrator;
pub mod queue;
pub mod registry;
pub mod stats;

mod persist;
mod retry;
mod state;
mod worker;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use events::{EventBus, TaskEvent};
pub use janitor::JanitorConfig;
pub use orchestrator::Orchestrator;
pub use queue::{QueueEntry, TaskQueue};
pub use registry::{handler_fn, HandlerRegistry, TaskContext, TaskHandler};
pub use stats::Statistics;
pub use worker::PANIC_MESSAGE;
