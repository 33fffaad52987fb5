//! Core engine types.
//!
//! This module contains the plain data shared by the worker and the
//! presentation layer:
//! - [`REConfigParams`]: Immutable per-run upscaler configuration
//! - [`Task`]: One unit of work in a run queue
//! - [`ProgressTracker`]: Race-free progress triple
//! - [`RunControl`]: Pause/cancel gate
//! - [`EngineEvent`]: Worker to presentation messages

mod event;
mod progress;
mod state;
mod task;
mod types;

pub use event::{EngineEvent, RunReport};
pub use progress::{ProgressTracker, ProgressValue};
pub use state::{GateDecision, RunControl, RunState};
pub use task::{PipelineStep, Task, TaskContext};
pub use types::{DownsampleFilter, REConfigParams, ResizeMode, RunOptions};
