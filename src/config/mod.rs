//! Configuration models for pools, debouncing and watchdogs.

pub mod pool;

pub use pool::{DebounceConfig, TimeboundConfig, ToolkitConfig, WorkerPoolConfig};
