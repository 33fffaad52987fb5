//! The upscale step: plan, chain native passes through the external binary,
//! reconcile to the target size.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::core::{REConfigParams, TaskContext};
use crate::processing::codec;
use crate::processing::resize::{self, ResizePlan};
use crate::processing::upscaler::{UpscalerFamily, parse_progress};
use crate::utils::{
    EngineResult, ImageFormat, ensure_parent_dir, extract_filename, format_from_extension,
    remove_temp_file, temp_path,
};

/// Upscale one image to `output`.
#[derive(Debug, Clone)]
pub struct UpscaleTask {
    pub input: PathBuf,
    pub output: PathBuf,
    pub params: Arc<REConfigParams>,
    /// False when a compress step consumes `output` and closes the unit
    pub closes_unit: bool,
    /// Delete `input` once the output is written (scratch inputs only)
    pub consume_input: bool,
}

impl UpscaleTask {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, params: Arc<REConfigParams>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            params,
            closes_unit: true,
            consume_input: false,
        }
    }

    /// Leave the progress unit open for a following compress step.
    pub fn feeding_compress(mut self) -> Self {
        self.closes_unit = false;
        self
    }

    pub fn consuming_input(mut self) -> Self {
        self.consume_input = true;
        self
    }

    pub fn describe(&self) -> String {
        format!("Upscale {}", self.input.display())
    }

    pub fn execute(&mut self, ctx: &mut TaskContext<'_>) -> EngineResult<()> {
        if let Err(e) = self.upscale(ctx) {
            // a compress step would otherwise pick up the reserved placeholder
            if !self.closes_unit {
                remove_temp_file(&self.output);
            }
            return Err(e);
        }

        if self.consume_input {
            remove_temp_file(&self.input);
        }
        ctx.set_fraction(1.0);
        info!("Upscaled {} -> {}", self.input.display(), self.output.display());
        Ok(())
    }

    fn upscale(&self, ctx: &mut TaskContext<'_>) -> EngineResult<()> {
        let (width, height) = codec::image_dimensions(&self.input)?;
        let params = &self.params;
        let plan = resize::plan(
            width,
            height,
            params.resize_mode,
            params.resize_mode_value,
            params.model_factor,
            params.use_preupscale,
        )?;

        ctx.log(format!(
            "Upscaling {} ({}x{} -> {}x{}, {} pass(es) of {}x)",
            extract_filename(&self.input),
            width,
            height,
            plan.target_width,
            plan.target_height,
            plan.passes(),
            params.model_factor
        ));

        let mut scratch = Vec::new();
        let result = self.run_plan(ctx, &plan, &mut scratch);
        for path in &scratch {
            remove_temp_file(path);
        }
        result
    }

    fn run_plan(&self, ctx: &mut TaskContext<'_>, plan: &ResizePlan, scratch: &mut Vec<PathBuf>) -> EngineResult<()> {
        let params = &self.params;
        let family = UpscalerFamily::detect(&params.upscaler);
        ensure_parent_dir(&self.output)?;

        let mut current = self.input.clone();
        if let Some((w, h)) = plan.pre_resize {
            let next = scratch_path(scratch)?;
            resize::resize_file(&current, &next, w, h, params.downsample_filter)?;
            current = next;
        } else if format_from_extension(&current)? == ImageFormat::TIFF {
            // ncnn upscalers cannot decode TIFF; hand them a PNG proxy
            let next = scratch_path(scratch)?;
            let (w, h) = codec::image_dimensions(&current)?;
            resize::resize_file(&current, &next, w, h, params.downsample_filter)?;
            current = next;
        }

        // Upscalers write jpg/png/webp only; anything else goes through the reconcile step
        let direct_output = !plan.needs_post_resize() && writable_by_upscaler(&self.output);
        let passes = plan.passes();
        for (pass, &factor) in plan.chained_scale_factors.iter().enumerate() {
            let last = pass + 1 == passes;
            let next = if last && direct_output {
                self.output.clone()
            } else {
                scratch_path(scratch)?
            };

            let args = family.build_args(params, &current, &next, factor)?;
            debug!("Pass {}/{} for {}", pass + 1, passes, self.input.display());
            let outcome = ctx.run_process(&params.upscaler, &args, |line| {
                parse_progress(line).map(|f| (pass as f64 + f) / passes as f64)
            })?;
            outcome.into_result(&params.upscaler)?;
            current = next;
        }

        if current != self.output {
            resize::resize_file(
                &current,
                &self.output,
                plan.target_width,
                plan.target_height,
                params.downsample_filter,
            )?;
        }
        Ok(())
    }
}

fn scratch_path(scratch: &mut Vec<PathBuf>) -> EngineResult<PathBuf> {
    let path = temp_path("png")?;
    scratch.push(path.clone());
    Ok(path)
}

fn writable_by_upscaler(path: &Path) -> bool {
    matches!(
        format_from_extension(path),
        Ok(ImageFormat::JPEG | ImageFormat::PNG | ImageFormat::WebP)
    )
}
