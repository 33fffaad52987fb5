//! Encoding helpers on top of the `image` and `webp` crates.

use std::fs::File;
use std::io::BufWriter;
use std::ops::Deref;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader};
use tracing::debug;

use crate::utils::{EngineError, EngineResult, ImageFormat, ensure_parent_dir, format_from_extension};

/// Decode `path`, sniffing the format from its content rather than its extension.
///
/// Scratch files named for the format an upscaler was asked to write may hold
/// another format when the tool falls back silently.
pub fn open_image(path: &Path) -> EngineResult<DynamicImage> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
}

/// Read `(width, height)` without decoding the pixel data.
pub fn image_dimensions(path: &Path) -> EngineResult<(u32, u32)> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.into_dimensions()?)
}

/// Save `image` in the format implied by the extension of `path`.
///
/// JPEG has no alpha channel, so RGBA input is flattened first.
pub fn save_image(image: &DynamicImage, path: &Path) -> EngineResult<()> {
    ensure_parent_dir(path)?;
    match format_from_extension(path)? {
        ImageFormat::JPEG if image.color().has_alpha() => {
            DynamicImage::ImageRgb8(image.to_rgb8()).save(path)?
        }
        _ => image.save(path)?,
    }
    Ok(())
}

/// Re-encode `input` into `output` with a lossy codec at `quality` (1-100).
///
/// The codec follows the output extension: JPEG through `image`, WebP through `webp`.
pub fn encode_lossy(input: &Path, output: &Path, quality: u8) -> EngineResult<()> {
    let format = format_from_extension(output)?;
    let image = open_image(input)?;
    ensure_parent_dir(output)?;

    match format {
        ImageFormat::JPEG => {
            let writer = BufWriter::new(File::create(output)?);
            let encoder = JpegEncoder::new_with_quality(writer, quality);
            DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)?;
        }
        ImageFormat::WebP => {
            // libwebp only takes 8-bit RGB(A)
            let image = if image.color().has_alpha() {
                DynamicImage::ImageRgba8(image.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(image.to_rgb8())
            };
            let encoder = webp::Encoder::from_image(&image)
                .map_err(|reason| EngineError::codec(format!("WebP encoder rejected image: {reason}")))?;
            let memory = encoder.encode(quality as f32);
            std::fs::write(output, memory.deref())?;
        }
        other => {
            return Err(EngineError::codec(format!(
                "{other:?} is not a lossy output format"
            )));
        }
    }

    debug!("Lossy re-encode {} -> {} (q={})", input.display(), output.display(), quality);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("in.png");
        RgbaImage::from_fn(32, 16, |x, y| Rgba([x as u8 * 8, y as u8 * 16, 128, 200]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn jpeg_and_webp_outputs_decode() {
        let dir = tempfile::tempdir().unwrap();
        let input = sample(dir.path());
        for name in ["out.jpg", "out.webp"] {
            let output = dir.path().join(name);
            encode_lossy(&input, &output, 70).unwrap();
            assert_eq!(image::image_dimensions(&output).unwrap(), (32, 16));
        }
    }

    #[test]
    fn png_is_not_a_lossy_target() {
        let dir = tempfile::tempdir().unwrap();
        let input = sample(dir.path());
        let err = encode_lossy(&input, &dir.path().join("out.png"), 70).unwrap_err();
        assert!(matches!(err, EngineError::Codec(_)));
    }

    #[test]
    fn content_sniffing_ignores_misleading_extension() {
        let dir = tempfile::tempdir().unwrap();
        let input = sample(dir.path());
        let disguised = dir.path().join("really-png.webp");
        std::fs::copy(&input, &disguised).unwrap();
        assert_eq!(image_dimensions(&disguised).unwrap(), (32, 16));
        assert_eq!(open_image(&disguised).unwrap().width(), 32);
    }

    #[test]
    fn save_flattens_alpha_for_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let image = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
        save_image(&image, &dir.path().join("nested/a.jpg")).unwrap();
        assert!(dir.path().join("nested/a.jpg").exists());
    }
}
