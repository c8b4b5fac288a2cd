//! Domain types for the taskforge background task engine.
//!
//! Zero internal dependencies: everything here is shared by the store
//! implementations and the engine.

pub mod error;
pub mod retry;
pub mod scheduling;
pub mod store;
pub mod task;
pub mod task_events;
pub mod types;
