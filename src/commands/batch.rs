//! Batch entry points: turn an input path into a run queue and start it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::core::{REConfigParams, RunOptions, Task};
use crate::processing::{
    CommandTemplate, CustomCompressTask, LossyCompressTask, SplitAnimatedImageTask, UpscaleTask,
};
use crate::utils::validation::wants_lossy;
use crate::utils::{
    ConfigError, EngineResult, ImageFormat, format_from_extension, is_supported_input, temp_path,
    validate_input_path, validate_run,
};
use crate::worker::{RunHandle, TaskQueue, submit};

/// Everything needed to start one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    /// A single image or a folder walked recursively
    pub input: PathBuf,
    /// Output file or folder; derived from the input when absent
    pub output: Option<PathBuf>,
    pub params: REConfigParams,
    pub options: RunOptions,
}

/// A validated queue ready to submit.
#[derive(Debug)]
pub struct PreparedBatch {
    pub queue: TaskQueue,
    /// One unit per input file
    pub total_units: usize,
    pub output: PathBuf,
}

/// Validate `request` and start the run on a worker thread.
///
/// Configuration problems are returned here; nothing has been queued or
/// spawned when this fails.
pub fn start_batch(request: &BatchRequest) -> EngineResult<RunHandle> {
    let prepared = prepare_batch(request)?;
    info!(
        "Starting batch: {} -> {} ({} files)",
        request.input.display(),
        prepared.output.display(),
        prepared.total_units
    );
    submit(prepared.queue, prepared.total_units, &request.options)
}

/// Validate `request` and build its queue without starting anything.
pub fn prepare_batch(request: &BatchRequest) -> EngineResult<PreparedBatch> {
    validate_input_path(&request.input)?;
    validate_run(&request.params, &request.options)?;

    let output = request
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&request.input, &request.params, &request.options));
    let params = Arc::new(request.params.clone());
    let (queue, total_units) = build_queue(&request.input, &output, params, &request.options)?;

    Ok(PreparedBatch {
        queue,
        total_units,
        output,
    })
}

/// Build the run queue for a file or folder input.
pub fn build_queue(
    input: &Path,
    output: &Path,
    params: Arc<REConfigParams>,
    options: &RunOptions,
) -> EngineResult<(TaskQueue, usize)> {
    let template = match params.custom_command.trim() {
        "" => None,
        command => Some(CommandTemplate::parse(command)?),
    };
    let builder = PipelineBuilder {
        params,
        options,
        template,
    };

    let mut queue = TaskQueue::new();
    if !input.is_dir() {
        if !is_supported_input(input) {
            return Err(ConfigError::UnsupportedInput(input.to_path_buf()).into());
        }
        queue.extend(builder.file_pipeline(input, output.to_path_buf(), false)?);
        return Ok((queue, 1));
    }

    let mut files = 0;
    for entry in WalkDir::new(input)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() != output)
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_supported_input(path) {
            continue;
        }
        let relative = path.strip_prefix(input).unwrap_or(path);
        queue.extend(builder.file_pipeline(path, output.join(relative), true)?);
        files += 1;
    }

    if files == 0 {
        return Err(ConfigError::EmptyFolder(input.to_path_buf()).into());
    }
    debug!("Queued {} tasks for {} files under {}", queue.len(), files, input.display());
    Ok((queue, files))
}

struct PipelineBuilder<'a> {
    params: Arc<REConfigParams>,
    options: &'a RunOptions,
    template: Option<CommandTemplate>,
}

impl PipelineBuilder<'_> {
    /// Tasks for one input file; together they close exactly one unit.
    fn file_pipeline(&self, input: &Path, mut output: PathBuf, in_folder: bool) -> EngineResult<Vec<Task>> {
        let params = self.params.clone();

        if format_from_extension(input)? == ImageFormat::GIF {
            return Ok(vec![Task::SplitAnimatedImage(SplitAnimatedImageTask::new(
                input,
                output,
                params,
                self.options.optimize_gif,
            ))]);
        }

        if let Some(template) = &self.template {
            let scratch = temp_path("png")?;
            return Ok(vec![
                Task::Upscale(UpscaleTask::new(input, scratch.clone(), params).feeding_compress()),
                Task::CustomCompress(CustomCompressTask::new(scratch, output, template.clone())),
            ]);
        }

        if self.options.lossy_mode && wants_lossy(&output) {
            let scratch = temp_path("webp")?;
            return Ok(vec![
                Task::Upscale(UpscaleTask::new(input, scratch.clone(), params).feeding_compress()),
                Task::LossyCompress(LossyCompressTask::new(scratch, output, self.options.lossy_quality)),
            ]);
        }

        if in_folder && format_from_extension(input)? == ImageFormat::TIFF {
            output.set_extension(lossless_extension(self.options));
        }
        Ok(vec![Task::Upscale(UpscaleTask::new(input, output, params))])
    }
}

fn lossless_extension(options: &RunOptions) -> &'static str {
    if options.use_webp { "webp" } else { "png" }
}

/// Default output next to the input: `<stem> (<model> <suffix>)<ext>`.
///
/// jpg and tif inputs (and every input when a custom command is set) get a
/// png output, which becomes webp when WebP output is preferred. Folders get
/// the same suffix with no extension.
pub fn default_output_path(input: &Path, params: &REConfigParams, options: &RunOptions) -> PathBuf {
    let suffix = params.resize_mode.suffix(params.resize_mode_value);
    let tag = format!(" ({} {})", params.model, suffix);

    if input.is_dir() {
        let mut name = input.as_os_str().to_os_string();
        name.push(&tag);
        return PathBuf::from(name);
    }

    let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let mut ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = ext.to_lowercase();
    if matches!(lower.as_str(), "jpg" | "tif" | "tiff") || !params.custom_command.trim().is_empty() {
        ext = "png".into();
    }
    if ext.eq_ignore_ascii_case("png") && options.use_webp {
        ext = "webp".into();
    }

    let file_name = if ext.is_empty() {
        format!("{stem}{tag}")
    } else {
        format!("{stem}{tag}.{ext}")
    };
    input.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResizeMode;

    fn params() -> REConfigParams {
        REConfigParams {
            model: "realesrgan-x4plus".into(),
            ..REConfigParams::default()
        }
    }

    fn labels(queue: &mut TaskQueue) -> Vec<String> {
        std::iter::from_fn(|| queue.pop()).map(|t| t.describe()).collect()
    }

    fn write_png(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        image::RgbaImage::new(4, 4).save(path).unwrap();
    }

    #[test]
    fn default_names_follow_mode_and_format() {
        let p = params();
        let opts = RunOptions::default();
        assert_eq!(
            default_output_path(Path::new("/in/cat.jpg"), &p, &opts),
            PathBuf::from("/in/cat (realesrgan-x4plus x4).png")
        );
        assert_eq!(
            default_output_path(Path::new("/in/cat.jpeg"), &p, &opts),
            PathBuf::from("/in/cat (realesrgan-x4plus x4).jpeg")
        );

        let p = REConfigParams { resize_mode: ResizeMode::Width, resize_mode_value: 1920, ..params() };
        let webp = RunOptions { use_webp: true, ..RunOptions::default() };
        assert_eq!(
            default_output_path(Path::new("/in/cat.tif"), &p, &webp),
            PathBuf::from("/in/cat (realesrgan-x4plus w1920).webp")
        );
    }

    #[test]
    fn custom_command_forces_png_name() {
        let p = REConfigParams { custom_command: "oxipng -o {output} {input}".into(), ..params() };
        assert_eq!(
            default_output_path(Path::new("/in/a.webp"), &p, &RunOptions::default()),
            PathBuf::from("/in/a (realesrgan-x4plus x4).png")
        );
    }

    #[test]
    fn folder_walk_queues_one_unit_per_image() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        write_png(&input.join("a.png"));
        write_png(&input.join("nested/b.png"));
        std::fs::write(input.join("readme.txt"), b"skip").unwrap();
        write_png(&input.join("c.tif"));

        let out = dir.path().join("out");
        let (mut queue, units) = build_queue(&input, &out, Arc::new(params()), &RunOptions::default()).unwrap();
        assert_eq!(units, 3);

        let mut outputs = Vec::new();
        while let Some(task) = queue.pop() {
            if let Task::Upscale(t) = task {
                outputs.push(t.output);
            }
        }
        assert_eq!(
            outputs,
            [out.join("a.png"), out.join("c.png"), out.join("nested/b.png")]
        );
    }

    #[test]
    fn empty_folder_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        let err = build_queue(dir.path(), &dir.path().join("out"), Arc::new(params()), &RunOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            crate::utils::EngineError::Config(ConfigError::EmptyFolder(_))
        ));
    }

    #[test]
    fn lossy_and_custom_pipelines_chain_through_scratch_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.png");
        write_png(&input);

        let lossy = RunOptions { lossy_mode: true, ..RunOptions::default() };
        let (mut queue, units) =
            build_queue(&input, &dir.path().join("a.jpg"), Arc::new(params()), &lossy).unwrap();
        assert_eq!(units, 1);
        let (Some(Task::Upscale(up)), Some(Task::LossyCompress(lc))) = (queue.pop(), queue.pop()) else {
            panic!("expected upscale then lossy compress");
        };
        assert!(!up.closes_unit);
        assert_eq!(up.output, lc.input);
        assert_eq!(lc.input.extension().unwrap(), "webp");
        std::fs::remove_file(&lc.input).unwrap();

        // png output is not a lossy target
        let (mut queue, _) = build_queue(&input, &dir.path().join("b.png"), Arc::new(params()), &lossy).unwrap();
        assert_eq!(labels(&mut queue).len(), 1);

        let custom = Arc::new(REConfigParams { custom_command: "cp {input} {output}".into(), ..params() });
        let (mut queue, _) = build_queue(&input, &dir.path().join("c.png"), custom, &RunOptions::default()).unwrap();
        let (Some(Task::Upscale(up)), Some(Task::CustomCompress(cc))) = (queue.pop(), queue.pop()) else {
            panic!("expected upscale then custom compress");
        };
        assert_eq!(up.output, cc.input);
        assert!(cc.delete_input_on_success);
        std::fs::remove_file(&cc.input).unwrap();
    }

    #[test]
    fn gif_becomes_split_task() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("anim.gif");
        std::fs::write(&input, b"GIF89a").unwrap();
        let (mut queue, units) =
            build_queue(&input, &dir.path().join("out.gif"), Arc::new(params()), &RunOptions::default()).unwrap();
        assert_eq!(units, 1);
        assert!(matches!(queue.pop(), Some(Task::SplitAnimatedImage(_))));
        assert!(queue.is_empty());
    }
}
