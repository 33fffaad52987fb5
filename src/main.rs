// This is the command-line entry point for the batch upscaler.
// The lib.rs file holds the engine; this file only parses arguments,
// starts a run and renders its events.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use batch_upscaler_lib::core::DownsampleFilter;
use batch_upscaler_lib::processing::UpscalerFamily;
use batch_upscaler_lib::processing::upscaler::model_factor;
use batch_upscaler_lib::{
    BatchRequest, EngineEvent, REConfigParams, ResizeMode, RunOptions, RunState, start_batch,
};

#[derive(Parser, Debug)]
#[command(name = "batch-upscaler")]
#[command(about = "Batch-upscale images with an external ncnn-vulkan upscaler", long_about = None)]
struct Cli {
    /// More log output (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upscale one image or every image under a folder
    Run(RunArgs),
    /// List the models the upscaler can load from the model directory
    Models(UpscalerArgs),
}

#[derive(clap::Args, Debug)]
struct UpscalerArgs {
    /// Upscaler executable; the family is detected from its file name
    #[arg(long, env = "UPSCALER_PATH", default_value = "realesrgan-ncnn-vulkan")]
    upscaler: PathBuf,
    /// Directory holding the model files
    #[arg(long, env = "UPSCALER_MODEL_DIR", default_value = "models")]
    model_dir: PathBuf,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Image file or folder
    input: PathBuf,
    /// Output file or folder (defaults to a name derived from the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    upscaler: UpscalerArgs,
    #[arg(short = 'n', long, default_value = "realesrgan-x4plus")]
    model: String,

    #[arg(long, value_enum, default_value_t = ModeArg::Ratio)]
    mode: ModeArg,
    /// Ratio, or target pixels for the other modes
    #[arg(short = 's', long, default_value_t = 4)]
    value: u32,
    #[arg(long, value_enum, default_value_t = FilterArg::Lanczos)]
    filter: FilterArg,

    /// Tile size, 0 = auto
    #[arg(short = 't', long, default_value_t = 0)]
    tile: u32,
    /// GPU index, -1 = auto
    #[arg(short = 'g', long, default_value_t = -1, allow_negative_numbers = true)]
    gpu: i32,
    /// Test-time augmentation
    #[arg(long)]
    tta: bool,
    /// Resize before upscaling so native passes land on the target
    #[arg(long)]
    preupscale: bool,
    /// Compression command run on each upscaled image, e.g. `pngquant -o {output} {input}`
    #[arg(long, default_value = "")]
    custom_command: String,

    /// Log failing images and keep going
    #[arg(long)]
    ignore_errors: bool,
    /// Also write the run log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Re-encode jpg/webp outputs through the lossy codec
    #[arg(long)]
    lossy: bool,
    #[arg(long, default_value_t = 80)]
    quality: u8,
    /// Prefer WebP over PNG for lossless outputs
    #[arg(long)]
    webp: bool,
    /// Clean up GIF transparency when merging frames
    #[arg(long)]
    optimize_gif: bool,

    /// Print engine events as JSON lines instead of plain log lines
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Ratio,
    Width,
    Height,
    Longest,
    Shortest,
}

impl From<ModeArg> for ResizeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Ratio => ResizeMode::Ratio,
            ModeArg::Width => ResizeMode::Width,
            ModeArg::Height => ResizeMode::Height,
            ModeArg::Longest => ResizeMode::LongestSide,
            ModeArg::Shortest => ResizeMode::ShortestSide,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FilterArg {
    Lanczos,
    Bicubic,
    Bilinear,
    Gaussian,
    Nearest,
}

impl From<FilterArg> for DownsampleFilter {
    fn from(filter: FilterArg) -> Self {
        match filter {
            FilterArg::Lanczos => DownsampleFilter::Lanczos,
            FilterArg::Bicubic => DownsampleFilter::Bicubic,
            FilterArg::Bilinear => DownsampleFilter::Bilinear,
            FilterArg::Gaussian => DownsampleFilter::Gaussian,
            FilterArg::Nearest => DownsampleFilter::Nearest,
        }
    }
}

impl RunArgs {
    fn into_request(self) -> BatchRequest {
        let params = REConfigParams {
            model_factor: model_factor(&self.model),
            upscaler: self.upscaler.upscaler,
            model: self.model,
            model_dir: self.upscaler.model_dir,
            resize_mode: self.mode.into(),
            resize_mode_value: self.value,
            downsample_filter: self.filter.into(),
            tile_size: self.tile,
            gpu_id: self.gpu,
            use_tta: self.tta,
            use_preupscale: self.preupscale,
            custom_command: self.custom_command.trim().to_string(),
        };
        let options = RunOptions {
            ignore_errors: self.ignore_errors,
            log_path: self.log_file,
            lossy_mode: self.lossy,
            lossy_quality: self.quality,
            use_webp: self.webp,
            optimize_gif: self.optimize_gif,
        };
        BatchRequest {
            input: self.input,
            output: self.output,
            params,
            options,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_names(false)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Models(args) => list_models(args),
    }
}

fn list_models(args: UpscalerArgs) -> Result<()> {
    let family = UpscalerFamily::detect(&args.upscaler);
    let models = family
        .discover_models(&args.model_dir)
        .with_context(|| format!("Failed to read model directory {}", args.model_dir.display()))?;
    debug!("{:?} family, {} models", family, models.len());
    for model in models {
        println!("{model} ({}x)", model_factor(&model));
    }
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    let json = args.json;
    let request = args.into_request();
    let handle = start_batch(&request).context("Failed to start batch")?;

    let control = handle.control();
    ctrlc::set_handler(move || {
        info!("Interrupted, cancelling after the current task");
        control.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;

    let mut stdout = std::io::stdout().lock();
    for event in handle.events().iter() {
        if json {
            writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
        } else {
            match &event {
                EngineEvent::Log { line } => writeln!(stdout, "{line}")?,
                EngineEvent::Progress { progress } => {
                    eprint!("\r{:6.2}% ({}/{})", progress.percentage(), progress.completed_tasks, progress.total_tasks);
                }
                EngineEvent::StateChanged { state } => debug!("Run state: {:?}", state),
                _ => {}
            }
        }
        if matches!(event, EngineEvent::Drained) {
            break;
        }
    }
    if !json {
        eprintln!();
    }

    let report = handle.join()?;
    match report.state {
        RunState::Failed => bail!(report.summary()),
        _ => {
            info!("{}", report.summary());
            Ok(())
        }
    }
}
