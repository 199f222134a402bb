//! Cairn Core
//!
//! Shared utilities for the Cairn asset runtime: hashing collections,
//! logging setup and the background task pool used for asynchronous loads.

pub mod alloc;
pub mod logging;
#[cfg(feature = "task-pool")]
pub mod task_pool;
