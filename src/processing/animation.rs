//! Animated GIF fan-out: split into frames, upscale each frame as its own
//! task, merge the results back with the original timing.
//!
//! The `image` GIF decoder yields fully composited canvas frames, so frame
//! disposal is already applied when frames are written to disk and every
//! merged frame is a full canvas.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::{AnimationDecoder, Delay, Frame, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::{REConfigParams, Task, TaskContext};
use crate::processing::codec::open_image;
use crate::processing::UpscaleTask;
use crate::utils::{EngineError, EngineResult, ensure_parent_dir, extract_filename, remove_temp_dir, temp_dir};

/// NeuQuant speed for plain merges (image crate default)
const DEFAULT_GIF_SPEED: i32 = 10;
/// Slowest, best palette when optimisation is requested
const OPTIMIZED_GIF_SPEED: i32 = 1;
/// GIF transparency is 1-bit; alpha below this becomes fully transparent
const ALPHA_THRESHOLD: u8 = 128;

/// Timing of one frame, in milliseconds as a ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMeta {
    pub delay_numer: u32,
    pub delay_denom: u32,
}

impl FrameMeta {
    fn delay(&self) -> Delay {
        Delay::from_numer_denom_ms(self.delay_numer, self.delay_denom)
    }
}

/// Decode `input` and write each frame as `frame-NNNNN.png` under `dir`.
pub fn split_frames(input: &Path, dir: &Path) -> EngineResult<Vec<(PathBuf, FrameMeta)>> {
    let decoder = GifDecoder::new(BufReader::new(File::open(input)?))?;
    let frames = decoder.into_frames().collect_frames()?;
    if frames.is_empty() {
        return Err(EngineError::codec(format!("{} has no frames", input.display())));
    }

    let mut written = Vec::with_capacity(frames.len());
    for (index, frame) in frames.into_iter().enumerate() {
        let (delay_numer, delay_denom) = frame.delay().numer_denom_ms();
        let path = dir.join(format!("frame-{index:05}.png"));
        frame.into_buffer().save(&path)?;
        written.push((path, FrameMeta { delay_numer, delay_denom }));
    }
    debug!("Split {} into {} frames", input.display(), written.len());
    Ok(written)
}

/// Encode `frames` in order into an infinitely looping GIF at `output`.
pub fn merge_frames(frames: &[(PathBuf, FrameMeta)], output: &Path, optimize: bool) -> EngineResult<()> {
    ensure_parent_dir(output)?;
    let speed = if optimize { OPTIMIZED_GIF_SPEED } else { DEFAULT_GIF_SPEED };
    let mut encoder = GifEncoder::new_with_speed(BufWriter::new(File::create(output)?), speed);
    encoder.set_repeat(Repeat::Infinite)?;

    for (path, meta) in frames {
        let mut buffer = open_image(path)?.to_rgba8();
        if optimize {
            snap_alpha(&mut buffer);
        }
        encoder.encode_frame(Frame::from_parts(buffer, 0, 0, meta.delay()))?;
    }
    debug!("Merged {} frames into {}", frames.len(), output.display());
    Ok(())
}

/// Resolve semi-transparent edges left by the upscaler into GIF's on/off alpha.
fn snap_alpha(buffer: &mut RgbaImage) {
    for pixel in buffer.pixels_mut() {
        if pixel[3] < ALPHA_THRESHOLD {
            pixel.0 = [0, 0, 0, 0];
        } else {
            pixel[3] = u8::MAX;
        }
    }
}

/// Split an animated image and fan out one upscale per frame plus a merge.
#[derive(Debug, Clone)]
pub struct SplitAnimatedImageTask {
    pub input: PathBuf,
    pub output: PathBuf,
    pub params: Arc<REConfigParams>,
    pub optimize_transparency: bool,
}

impl SplitAnimatedImageTask {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        params: Arc<REConfigParams>,
        optimize_transparency: bool,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            params,
            optimize_transparency,
        }
    }

    pub fn describe(&self) -> String {
        format!("Split {}", self.input.display())
    }

    pub fn execute(&mut self, ctx: &mut TaskContext<'_>) -> EngineResult<()> {
        let dir = temp_dir("frames-")?;
        let frames = match split_frames(&self.input, &dir) {
            Ok(frames) => frames,
            Err(e) => {
                remove_temp_dir(&dir);
                return Err(e);
            }
        };

        let count = frames.len();
        ctx.log(format!("Split {} into {} frames", extract_filename(&self.input), count));

        let mut upscaled = Vec::with_capacity(count);
        for (raw, meta) in frames {
            let target = raw.with_file_name(format!(
                "{}-up.png",
                raw.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default()
            ));
            ctx.enqueue(Task::Upscale(
                UpscaleTask::new(raw, target.clone(), self.params.clone()).consuming_input(),
            ));
            upscaled.push((target, meta));
        }
        ctx.enqueue(Task::MergeFrames(MergeFramesTask {
            frames: upscaled,
            output: self.output.clone(),
            frames_dir: dir,
            optimize_transparency: self.optimize_transparency,
        }));

        // N frames + 1 merge take over the single slot this task held
        ctx.add_units(count);
        Ok(())
    }
}

/// Reassemble upscaled frames into the final animation. Owns the frame
/// scratch directory and removes it whether or not the merge succeeds.
#[derive(Debug, Clone)]
pub struct MergeFramesTask {
    pub frames: Vec<(PathBuf, FrameMeta)>,
    pub output: PathBuf,
    pub frames_dir: PathBuf,
    pub optimize_transparency: bool,
}

impl MergeFramesTask {
    pub fn describe(&self) -> String {
        format!("Merge {} frames into {}", self.frames.len(), self.output.display())
    }

    pub fn execute(&mut self, ctx: &mut TaskContext<'_>) -> EngineResult<()> {
        let result = merge_frames(&self.frames, &self.output, self.optimize_transparency);
        remove_temp_dir(&self.frames_dir);
        result?;

        ctx.log(format!("Merged {} frames into {}", self.frames.len(), extract_filename(&self.output)));
        ctx.set_fraction(1.0);
        info!("Wrote animation {}", self.output.display());
        Ok(())
    }

    pub fn abandon(&mut self) {
        remove_temp_dir(&self.frames_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    pub(crate) fn write_gif(path: &Path, delays_ms: &[u32]) {
        let mut encoder = GifEncoder::new(File::create(path).unwrap());
        encoder.set_repeat(Repeat::Infinite).unwrap();
        for (i, &ms) in delays_ms.iter().enumerate() {
            let buffer = RgbaImage::from_pixel(8, 6, Rgba([(i * 60) as u8, 20, 200, 255]));
            encoder
                .encode_frame(Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(ms, 1)))
                .unwrap();
        }
    }

    fn delays(path: &Path) -> Vec<(u32, u32)> {
        GifDecoder::new(BufReader::new(File::open(path).unwrap()))
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap()
            .iter()
            .map(|f| f.delay().numer_denom_ms())
            .collect()
    }

    #[test]
    fn split_then_merge_keeps_count_order_and_timing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.gif");
        write_gif(&input, &[100, 40, 250]);

        let frames = split_frames(&input, dir.path()).unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames[0].0.ends_with("frame-00000.png"));

        let output = dir.path().join("out.gif");
        merge_frames(&frames, &output, true).unwrap();
        assert_eq!(delays(&output), delays(&input));
    }

    #[test]
    fn snapping_makes_alpha_binary() {
        let mut buffer = RgbaImage::from_fn(2, 1, |x, _| Rgba([9, 9, 9, if x == 0 { 10 } else { 200 }]));
        snap_alpha(&mut buffer);
        assert_eq!(buffer.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(buffer.get_pixel(1, 0).0, [9, 9, 9, 255]);
    }

    #[test]
    fn non_gif_input_is_a_codec_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("fake.gif");
        std::fs::write(&input, b"not a gif").unwrap();
        assert!(matches!(split_frames(&input, dir.path()), Err(EngineError::Codec(_))));
    }
}
