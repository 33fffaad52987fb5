// Module declarations in dependency order
pub mod utils;
pub mod core;
pub mod processing;
pub mod worker;
pub mod commands;

// Public exports for external consumers
pub use crate::core::{
    EngineEvent, PipelineStep, ProgressValue, REConfigParams, ResizeMode, RunOptions, RunReport, RunState,
    Task, TaskContext,
};
pub use crate::utils::{ConfigError, EngineError, EngineResult};
pub use crate::worker::{RunHandle, TaskQueue, submit};
pub use crate::commands::*;

// This library file is the engine's public API.
// The CLI entry point is in main.rs.
