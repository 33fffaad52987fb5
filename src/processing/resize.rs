//! Resize planning for the upscale pipeline.
//!
//! The external upscaler only produces fixed native multiples, so every
//! requested size is reached by chaining native passes and reconciling the
//! result with one resize through the configured downsample filter.

use std::path::Path;
use image::GenericImageView;
use serde::Serialize;
use tracing::debug;

use crate::core::{DownsampleFilter, ResizeMode};
use crate::processing::codec::{open_image, save_image};
use crate::utils::{ConfigError, EngineResult};

/// Steps needed to bring an image to its target size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizePlan {
    pub target_width: u32,
    pub target_height: u32,
    /// One native factor per upscaler pass, in order
    pub chained_scale_factors: Vec<u32>,
    /// Resize the input to this size before the first pass
    pub pre_resize: Option<(u32, u32)>,
    /// Size the passes produce before the final reconcile step
    pub native_width: u32,
    pub native_height: u32,
}

impl ResizePlan {
    /// Whether the native output has to be downsampled to the target
    pub fn needs_post_resize(&self) -> bool {
        (self.native_width, self.native_height) != (self.target_width, self.target_height)
    }

    pub fn passes(&self) -> usize {
        self.chained_scale_factors.len()
    }
}

/// Validate a resize request before any task is queued.
///
/// Ratio 1 would leave the image unchanged and zero values are meaningless.
pub fn validate_request(mode: ResizeMode, value: u32) -> Result<(), ConfigError> {
    match mode {
        ResizeMode::Ratio if value <= 1 => Err(ConfigError::InvalidResizeRatio(value)),
        _ if value == 0 => Err(ConfigError::InvalidResizeValue(value)),
        _ => Ok(()),
    }
}

/// Compute target size and native pass chain for one image.
///
/// `preupscale` resizes the input first so the passes land on the target
/// without overshooting by a whole native factor.
pub fn plan(
    original_width: u32,
    original_height: u32,
    mode: ResizeMode,
    value: u32,
    model_factor: u32,
    preupscale: bool,
) -> Result<ResizePlan, ConfigError> {
    if original_width == 0 || original_height == 0 {
        return Err(ConfigError::InvalidDimensions {
            width: original_width,
            height: original_height,
        });
    }
    validate_request(mode, value)?;

    let (w, h) = (original_width as u64, original_height as u64);
    let v = value as u64;
    let (target_width, target_height) = match mode {
        ResizeMode::Ratio => (w * v, h * v),
        ResizeMode::Width => (v, proportional(h, v, w)),
        ResizeMode::Height => (proportional(w, v, h), v),
        ResizeMode::LongestSide if w >= h => (v, proportional(h, v, w)),
        ResizeMode::LongestSide => (proportional(w, v, h), v),
        ResizeMode::ShortestSide if w <= h => (v, proportional(h, v, w)),
        ResizeMode::ShortestSide => (proportional(w, v, h), v),
    };

    // Magnification the passes must cover on the more demanding axis.
    let scale = (target_width as f64 / w as f64).max(target_height as f64 / h as f64);
    let factor = model_factor.max(1) as u64;

    let mut passes = 1u32;
    let mut multiple = factor;
    if factor > 1 {
        if preupscale {
            while (multiple * factor) as f64 <= scale {
                multiple *= factor;
                passes += 1;
            }
        } else {
            while (multiple as f64) < scale {
                multiple *= factor;
                passes += 1;
            }
        }
    }

    let pre_resize = if preupscale && multiple as f64 != scale {
        Some((
            target_width.div_ceil(multiple).max(1),
            target_height.div_ceil(multiple).max(1),
        ))
    } else {
        None
    };
    let (base_w, base_h) = pre_resize.unwrap_or((w, h));

    let plan = ResizePlan {
        target_width: clamp_u32(target_width),
        target_height: clamp_u32(target_height),
        chained_scale_factors: vec![factor as u32; passes as usize],
        pre_resize: pre_resize.map(|(w, h)| (clamp_u32(w), clamp_u32(h))),
        native_width: clamp_u32(base_w * multiple),
        native_height: clamp_u32(base_h * multiple),
    };
    debug!(
        "Planned {}x{} -> {}x{} via {} pass(es) of {}x (pre-resize: {:?})",
        original_width, original_height, plan.target_width, plan.target_height,
        plan.passes(), factor, plan.pre_resize
    );
    Ok(plan)
}

/// `a * num / den` rounded half up, at least 1.
fn proportional(a: u64, num: u64, den: u64) -> u64 {
    ((a * num * 2 + den) / (den * 2)).max(1)
}

fn clamp_u32(v: u64) -> u32 {
    v.min(u32::MAX as u64) as u32
}

/// Resample `input` to exactly `width`x`height` and write it to `output`.
pub fn resize_file(
    input: &Path,
    output: &Path,
    width: u32,
    height: u32,
    filter: DownsampleFilter,
) -> EngineResult<()> {
    let image = open_image(input)?;
    if image.dimensions() == (width, height) {
        return save_image(&image, output);
    }
    debug!(
        "Resizing {} {:?} -> {}x{} ({})",
        input.display(), image.dimensions(), width, height, filter
    );
    let resized = image.resize_exact(width, height, filter.into());
    save_image(&resized, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: [ResizeMode; 4] = [
        ResizeMode::Width,
        ResizeMode::Height,
        ResizeMode::LongestSide,
        ResizeMode::ShortestSide,
    ];

    #[test]
    fn ratio_multiplies_both_axes() {
        let p = plan(100, 50, ResizeMode::Ratio, 4, 4, false).unwrap();
        assert_eq!((p.target_width, p.target_height), (400, 200));
        assert_eq!(p.chained_scale_factors, vec![4]);
        assert!(!p.needs_post_resize());
    }

    #[test]
    fn ratio_one_is_rejected() {
        assert_eq!(
            plan(100, 50, ResizeMode::Ratio, 1, 4, false),
            Err(ConfigError::InvalidResizeRatio(1))
        );
        assert!(validate_request(ResizeMode::Ratio, 1).is_err());
        assert!(validate_request(ResizeMode::Width, 1).is_ok());
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        assert!(matches!(
            plan(0, 50, ResizeMode::Ratio, 2, 4, false),
            Err(ConfigError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            plan(10, 10, ResizeMode::Width, 0, 4, false),
            Err(ConfigError::InvalidResizeValue(0))
        ));
    }

    #[test]
    fn ratio_beyond_native_factor_chains_passes() {
        let p = plan(10, 10, ResizeMode::Ratio, 16, 4, false).unwrap();
        assert_eq!(p.chained_scale_factors, vec![4, 4]);
        assert!(!p.needs_post_resize());

        let p = plan(10, 10, ResizeMode::Ratio, 6, 4, false).unwrap();
        assert_eq!(p.chained_scale_factors, vec![4, 4]);
        assert_eq!((p.native_width, p.target_width), (160, 60));
        assert!(p.needs_post_resize());
    }

    #[test]
    fn ratio_below_native_factor_downsamples() {
        let p = plan(30, 20, ResizeMode::Ratio, 3, 4, false).unwrap();
        assert_eq!(p.chained_scale_factors, vec![4]);
        assert_eq!((p.native_width, p.native_height), (120, 80));
        assert_eq!((p.target_width, p.target_height), (90, 60));
    }

    #[test]
    fn fixed_axis_is_exact_and_other_axis_proportional() {
        for &mode in &MODES {
            for (w, h) in [(1, 1), (3, 7), (640, 480), (480, 640), (1000, 333), (17, 1024)] {
                for value in [1, 2, 99, 512, 1920, 4097] {
                    let p = plan(w, h, mode, value, 4, false).unwrap();
                    let width_fixed = match mode {
                        ResizeMode::Width => true,
                        ResizeMode::Height => false,
                        ResizeMode::LongestSide => w >= h,
                        ResizeMode::ShortestSide => w <= h,
                        ResizeMode::Ratio => unreachable!(),
                    };
                    let (fixed, other, expected) = if width_fixed {
                        (p.target_width, p.target_height, h as f64 * value as f64 / w as f64)
                    } else {
                        (p.target_height, p.target_width, w as f64 * value as f64 / h as f64)
                    };
                    assert_eq!(fixed, value, "{mode:?} {w}x{h} -> {value}");
                    assert!(
                        (other as f64 - expected.max(1.0)).abs() <= 1.0,
                        "{mode:?} {w}x{h} -> {value}: {other} vs {expected}"
                    );
                    // post step never enlarges
                    assert!(p.native_width >= p.target_width && p.native_height >= p.target_height);
                }
            }
        }
    }

    #[test]
    fn preupscale_lands_passes_near_target() {
        let p = plan(100, 100, ResizeMode::Ratio, 6, 4, true).unwrap();
        assert_eq!(p.chained_scale_factors, vec![4]);
        assert_eq!(p.pre_resize, Some((150, 150)));
        assert_eq!((p.native_width, p.target_width), (600, 600));
        assert!(!p.needs_post_resize());

        // exact multiple: no pre step
        let p = plan(100, 100, ResizeMode::Ratio, 16, 4, true).unwrap();
        assert_eq!(p.pre_resize, None);
        assert_eq!(p.passes(), 2);
    }

    #[test]
    fn preupscale_never_overshoots_by_rounding_down() {
        let p = plan(101, 37, ResizeMode::Width, 333, 4, true).unwrap();
        assert!(p.native_width >= p.target_width);
        assert!(p.native_height >= p.target_height);
    }

    #[test]
    fn resize_file_writes_exact_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        image::RgbaImage::new(40, 20).save(&input).unwrap();
        resize_file(&input, &output, 10, 5, DownsampleFilter::Lanczos).unwrap();
        assert_eq!(image::image_dimensions(&output).unwrap(), (10, 5));
    }
}
