//! Core types for upscaling parameters and run options.

use std::path::PathBuf;
use std::fmt;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

/// How the final output size is derived from the original size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResizeMode {
    /// Multiply both axes by the value
    Ratio,
    /// Fix the width, scale the height
    Width,
    /// Fix the height, scale the width
    Height,
    /// Fix whichever axis is longer
    LongestSide,
    /// Fix whichever axis is shorter
    ShortestSide,
}

impl ResizeMode {
    /// Suffix used in default output names, e.g. `x4` or `w1920`.
    pub fn suffix(&self, value: u32) -> String {
        let tag = match self {
            Self::Ratio => 'x',
            Self::Width => 'w',
            Self::Height => 'h',
            Self::LongestSide => 'l',
            Self::ShortestSide => 's',
        };
        format!("{tag}{value}")
    }
}

/// Resampling filter used for every non-AI resize step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DownsampleFilter {
    #[default]
    Lanczos,
    Bicubic,
    Bilinear,
    Gaussian,
    Nearest,
}

impl From<DownsampleFilter> for FilterType {
    fn from(filter: DownsampleFilter) -> Self {
        match filter {
            DownsampleFilter::Lanczos => FilterType::Lanczos3,
            DownsampleFilter::Bicubic => FilterType::CatmullRom,
            DownsampleFilter::Bilinear => FilterType::Triangle,
            DownsampleFilter::Gaussian => FilterType::Gaussian,
            DownsampleFilter::Nearest => FilterType::Nearest,
        }
    }
}

impl fmt::Display for DownsampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Upscaler configuration captured once per run.
///
/// Never mutated after the run starts; every task holds a shared reference,
/// so changing settings mid-run cannot affect in-flight work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct REConfigParams {
    /// Path to the external upscaler executable
    pub upscaler: PathBuf,
    /// Model name as listed by model discovery
    pub model: String,
    /// Native output multiple of the model
    pub model_factor: u32,
    /// Directory holding the model files
    pub model_dir: PathBuf,
    pub resize_mode: ResizeMode,
    /// Ratio, pixel width/height or side length depending on `resize_mode`
    pub resize_mode_value: u32,
    pub downsample_filter: DownsampleFilter,
    /// 0 lets the upscaler pick a tile size
    pub tile_size: u32,
    /// -1 lets the upscaler pick a device
    pub gpu_id: i32,
    pub use_tta: bool,
    pub use_preupscale: bool,
    /// Custom compression command template, empty when unused
    pub custom_command: String,
}

impl Default for REConfigParams {
    fn default() -> Self {
        Self {
            upscaler: PathBuf::from("realesrgan-ncnn-vulkan"),
            model: "realesrgan-x4plus".to_string(),
            model_factor: 4,
            model_dir: PathBuf::from("models"),
            resize_mode: ResizeMode::Ratio,
            resize_mode_value: 4,
            downsample_filter: DownsampleFilter::default(),
            tile_size: 0,
            gpu_id: -1,
            use_tta: false,
            use_preupscale: false,
            custom_command: String::new(),
        }
    }
}

/// Run-level options that shape queue building and failure handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    /// Log and skip failing tasks instead of halting the run
    pub ignore_errors: bool,
    /// Persist the run log to this file
    pub log_path: Option<PathBuf>,
    /// Re-encode jpg/webp outputs through the lossy codec
    pub lossy_mode: bool,
    /// Quality for the lossy codec, 1..=100
    pub lossy_quality: u8,
    /// Prefer WebP over PNG for lossless outputs
    pub use_webp: bool,
    /// Re-optimise GIF transparency when merging frames
    pub optimize_gif: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            ignore_errors: false,
            log_path: None,
            lossy_mode: false,
            lossy_quality: 80,
            use_webp: false,
            optimize_gif: false,
        }
    }
}
