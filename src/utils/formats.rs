use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use crate::utils::{ConfigError, EngineError};

/// Image container formats the engine reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    JPEG,
    PNG,
    GIF,
    WebP,
    TIFF,
}

impl ImageFormat {
    /// Get file extensions associated with this format
    pub fn extensions(&self) -> &[&str] {
        match self {
            Self::JPEG => &["jpg", "jpeg"],
            Self::PNG => &["png"],
            Self::GIF => &["gif"],
            Self::WebP => &["webp"],
            Self::TIFF => &["tif", "tiff"],
        }
    }

    /// Check if the extension matches this format
    pub fn matches_extension(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.extensions().contains(&ext.as_str())
    }

    /// Get the primary extension for this format
    pub fn primary_extension(&self) -> &str {
        self.extensions()[0]
    }

    /// Whether the lossy re-encode path can write this format
    pub fn supports_lossy(&self) -> bool {
        matches!(self, Self::JPEG | Self::WebP)
    }
}

impl FromStr for ImageFormat {
    type Err = EngineError;

    fn from_str(ext: &str) -> Result<Self, Self::Err> {
        let ext = ext.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Ok(Self::JPEG),
            "png" => Ok(Self::PNG),
            "gif" => Ok(Self::GIF),
            "webp" => Ok(Self::WebP),
            "tif" | "tiff" => Ok(Self::TIFF),
            _ => Err(EngineError::codec(format!("Unsupported image format: {ext}"))),
        }
    }
}

/// Get format from file extension
pub fn format_from_extension(path: &Path) -> Result<ImageFormat, EngineError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedInput(path.to_path_buf()))?;

    ImageFormat::from_str(ext)
}

/// Whether `path` has one of the extensions accepted as batch input.
pub fn is_supported_input(path: &Path) -> bool {
    format_from_extension(path).is_ok()
}
