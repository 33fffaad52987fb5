//! Error types for the upscaling engine.
//!
//! Provides a hierarchy of error types using `thiserror` for ergonomic error handling.
//! Configuration problems are kept apart from per-task failures: the former are
//! raised before any task is queued, the latter flow through the runner's
//! ignore-error policy.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use serde::Serialize;

/// Configuration errors surfaced before a run starts.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ConfigError {
    /// Ratio mode with a ratio that would not change the image
    #[error("Resize ratio must not be {0}")]
    InvalidResizeRatio(u32),
    /// Zero target for a width/height/side mode
    #[error("Resize value must be positive, got {0}")]
    InvalidResizeValue(u32),
    /// Original image dimensions that cannot be scaled
    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    /// Custom command template missing the output placeholder
    #[error("Malformed command template (needs an {{output}} token): {0}")]
    MalformedCommandTemplate(String),
    /// Upscaler executable not found
    #[error("Upscaler not found: {0}")]
    UpscalerNotFound(PathBuf),
    /// Requested model does not exist in the model directory
    #[error("Model not found: {0}")]
    ModelNotFound(String),
    /// Input path is missing or has an unsupported extension
    #[error("Unsupported input: {0}")]
    UnsupportedInput(PathBuf),
    /// Input folder contained no supported images
    #[error("No supported images found in {0}")]
    EmptyFolder(PathBuf),
    /// Nothing to run
    #[error("The task queue is empty")]
    EmptyQueue,
    /// Lossy quality outside 1..=100
    #[error("Invalid quality value: {0}. Must be between 1 and 100")]
    InvalidQuality(u8),
}

/// Main error type for the engine.
///
/// Everything a task can fail with is converted to this type so the runner
/// can log it and apply the ignore-error policy uniformly.
#[derive(Error, Debug, Clone, Serialize)]
pub enum EngineError {
    /// Configuration was rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// External executable could not be started
    #[error("Failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// External executable ran but reported failure
    #[error("{program} exited with {}", .code.map(|c| format!("code {c}")).unwrap_or_else(|| "a signal".to_string()))]
    Exit { program: String, code: Option<i32> },

    /// Decode/encode/merge failure inside the image codecs
    #[error("Codec error: {0}")]
    Codec(String),

    /// File IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Worker thread or runtime failure
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Convenience result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// Helper methods for error creation
impl EngineError {
    pub fn codec<T: Into<String>>(msg: T) -> Self {
        Self::Codec(msg.into())
    }

    pub fn io<T: Into<String>>(msg: T) -> Self {
        Self::Io(msg.into())
    }

    pub fn worker<T: Into<String>>(msg: T) -> Self {
        Self::Worker(msg.into())
    }

    pub fn spawn(program: impl Into<String>, err: &io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            reason: err.to_string(),
        }
    }

    /// Short label for the taxonomy bucket, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigurationError",
            Self::Spawn { .. } => "ProcessSpawnError",
            Self::Exit { .. } => "ProcessExitError",
            Self::Codec(_) => "CodecError",
            Self::Io(_) => "IOError",
            Self::Worker(_) => "WorkerError",
        }
    }
}

// Convert std::io::Error to EngineError
impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<image::ImageError> for EngineError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => Self::Io(e.to_string()),
            other => Self::Codec(other.to_string()),
        }
    }
}
