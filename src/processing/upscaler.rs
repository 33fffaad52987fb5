//! Upscaler executable families: argument mapping, model discovery and
//! progress parsing.
//!
//! Two ncnn-vulkan families are supported. Real-ESRGAN style binaries take a
//! model name plus a model directory; Real-CUGAN style binaries take a model
//! directory plus scale and noise level encoded in the model name
//! (`<dir>#up<scale>x-<noise>`).

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::REConfigParams;
use crate::utils::{ConfigError, EngineError, EngineResult, ImageFormat, format_from_extension};

const REALCUGAN_STEM: &str = "realcugan-ncnn-vulkan";
const DEFAULT_MODEL_FACTOR: u32 = 4;
const CUGAN_NOISE_LEVELS: [&str; 5] = ["conservative", "no-denoise", "denoise1x", "denoise2x", "denoise3x"];

lazy_static! {
    static ref MODEL_FACTOR_RE: Regex = Regex::new(r"(\d+)x|x(\d+)").expect("static regex");
    static ref PERCENT_RE: Regex = Regex::new(r"^\s*(\d+(?:\.\d+)?)%\s*$").expect("static regex");
    static ref CUGAN_MODEL_RE: Regex =
        Regex::new(r"^(?P<dir>[^#]+)#up(?P<scale>\d+)x-(?P<noise>conservative|no-denoise|denoise(?P<level>\d+)x)$")
            .expect("static regex");
}

/// Argument conventions of a supported upscaler binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpscalerFamily {
    RealEsrgan,
    RealCugan,
}

impl UpscalerFamily {
    /// Detect the family from the executable file stem.
    pub fn detect(executable: &Path) -> Self {
        match executable.file_stem().and_then(|s| s.to_str()) {
            Some(REALCUGAN_STEM) => Self::RealCugan,
            _ => Self::RealEsrgan,
        }
    }

    /// Build the argument vector for one native pass from `input` to `output`.
    pub fn build_args(
        &self,
        params: &REConfigParams,
        input: &Path,
        output: &Path,
        scale: u32,
    ) -> EngineResult<Vec<OsString>> {
        let format = output_format_arg(output)?;
        let mut args: Vec<OsString> = vec![
            "-i".into(),
            input.into(),
            "-o".into(),
            output.into(),
        ];

        match self {
            Self::RealEsrgan => {
                args.extend([
                    "-n".into(),
                    params.model.clone().into(),
                    "-s".into(),
                    scale.to_string().into(),
                    "-m".into(),
                    params.model_dir.clone().into_os_string(),
                ]);
            }
            Self::RealCugan => {
                let model = CuganModel::parse(&params.model)
                    .ok_or_else(|| ConfigError::ModelNotFound(params.model.clone()))?;
                args.extend([
                    "-m".into(),
                    params.model_dir.join(&model.dir).into_os_string(),
                    "-s".into(),
                    model.scale.to_string().into(),
                    "-n".into(),
                    model.noise.to_string().into(),
                ]);
            }
        }

        args.extend([
            "-t".into(),
            params.tile_size.to_string().into(),
            "-g".into(),
            params.gpu_id.to_string().into(),
            "-f".into(),
            format.into(),
        ]);
        if params.use_tta {
            args.push("-x".into());
        }
        Ok(args)
    }

    /// List the models available to this family under `model_dir`, sorted.
    pub fn discover_models(&self, model_dir: &Path) -> EngineResult<Vec<String>> {
        let mut models = Vec::new();
        match self {
            Self::RealEsrgan => {
                for entry in std::fs::read_dir(model_dir)? {
                    let path = entry?.path();
                    if !path.is_file() || path.extension().is_none_or(|e| e != "param") {
                        continue;
                    }
                    if path.with_extension("bin").is_file() {
                        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                            models.push(stem.to_string());
                        }
                    }
                }
            }
            Self::RealCugan => {
                let mut dirs: Vec<PathBuf> = std::fs::read_dir(model_dir)?
                    .filter_map(|e| e.ok().map(|e| e.path()))
                    .filter(|p| p.is_dir())
                    .collect();
                dirs.sort();
                for dir in dirs {
                    let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
                        continue;
                    };
                    for scale in 2..=4 {
                        for noise in CUGAN_NOISE_LEVELS {
                            let stem = format!("up{scale}x-{noise}");
                            if ["bin", "param"].iter().all(|ext| dir.join(format!("{stem}.{ext}")).is_file()) {
                                models.push(format!("{name}#{stem}"));
                            }
                        }
                    }
                }
            }
        }
        if matches!(self, Self::RealEsrgan) {
            models.sort();
        }
        Ok(models)
    }
}

/// Native output multiple encoded in a model name, e.g. `x4plus` → 4.
pub fn model_factor(model: &str) -> u32 {
    MODEL_FACTOR_RE
        .captures(model)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(DEFAULT_MODEL_FACTOR)
}

/// Parse an upscaler progress line such as `42.50%` into a fraction.
pub fn parse_progress(line: &str) -> Option<f64> {
    PERCENT_RE
        .captures(line)
        .and_then(|c| c[1].parse::<f64>().ok())
        .map(|pct| (pct / 100.0).clamp(0.0, 1.0))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CuganModel {
    dir: String,
    scale: u32,
    /// -1 conservative, 0 no denoise, N denoise level
    noise: i32,
}

impl CuganModel {
    fn parse(model: &str) -> Option<Self> {
        let caps = CUGAN_MODEL_RE.captures(model)?;
        let noise = match &caps["noise"] {
            "conservative" => -1,
            "no-denoise" => 0,
            _ => caps.name("level")?.as_str().parse().ok()?,
        };
        Some(Self {
            dir: caps["dir"].to_string(),
            scale: caps["scale"].parse().ok()?,
            noise,
        })
    }
}

fn output_format_arg(output: &Path) -> EngineResult<&'static str> {
    match format_from_extension(output)? {
        ImageFormat::JPEG => Ok("jpg"),
        ImageFormat::PNG => Ok("png"),
        ImageFormat::WebP => Ok("webp"),
        other => Err(EngineError::codec(format!(
            "Upscaler cannot write {other:?}: {}",
            output.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn detects_family_from_stem() {
        assert_eq!(UpscalerFamily::detect(Path::new("/opt/realcugan-ncnn-vulkan.exe")), UpscalerFamily::RealCugan);
        assert_eq!(UpscalerFamily::detect(Path::new("realesrgan-ncnn-vulkan")), UpscalerFamily::RealEsrgan);
    }

    #[test]
    fn model_factor_from_name() {
        assert_eq!(model_factor("realesrgan-x4plus-anime"), 4);
        assert_eq!(model_factor("RealESRGAN_x2plus"), 2);
        assert_eq!(model_factor("models-se#up3x-denoise1x"), 3);
        assert_eq!(model_factor("custom-model"), 4);
    }

    #[test]
    fn progress_lines_parse() {
        assert_eq!(parse_progress("50.00%"), Some(0.5));
        assert_eq!(parse_progress("  100%"), Some(1.0));
        assert_eq!(parse_progress("[0 NVIDIA GeForce]  queueC=2[8]"), None);
    }

    #[test]
    fn realesrgan_arguments() {
        let params = REConfigParams {
            model: "realesrgan-x4plus".into(),
            model_dir: "models".into(),
            tile_size: 256,
            gpu_id: 1,
            use_tta: true,
            ..REConfigParams::default()
        };
        let args = UpscalerFamily::RealEsrgan
            .build_args(&params, Path::new("a.png"), Path::new("b.webp"), 4)
            .unwrap();
        assert_eq!(
            strings(&args),
            ["-i", "a.png", "-o", "b.webp", "-n", "realesrgan-x4plus", "-s", "4", "-m", "models", "-t", "256", "-g", "1", "-f", "webp", "-x"]
        );
    }

    #[test]
    fn realcugan_arguments() {
        let params = REConfigParams {
            model: "models-se#up2x-denoise3x".into(),
            model_dir: PathBuf::from("models"),
            ..REConfigParams::default()
        };
        let args = strings(
            &UpscalerFamily::RealCugan
                .build_args(&params, Path::new("a.png"), Path::new("b.png"), 2)
                .unwrap(),
        );
        let model_path = PathBuf::from("models").join("models-se").to_string_lossy().into_owned();
        assert_eq!(args[4..10], ["-m".to_string(), model_path, "-s".into(), "2".into(), "-n".into(), "3".into()]);
        assert!(!args.contains(&"-x".to_string()));

        let conservative = REConfigParams { model: "m#up4x-conservative".into(), ..params.clone() };
        let args = strings(&UpscalerFamily::RealCugan.build_args(&conservative, Path::new("a"), Path::new("b.jpg"), 4).unwrap());
        assert!(args.windows(2).any(|w| w == ["-n", "-1"]));

        let bogus = REConfigParams { model: "realesrgan-x4plus".into(), ..params };
        assert!(UpscalerFamily::RealCugan.build_args(&bogus, Path::new("a"), Path::new("b.png"), 4).is_err());
    }

    #[test]
    fn tiff_output_is_rejected() {
        let err = UpscalerFamily::RealEsrgan
            .build_args(&REConfigParams::default(), Path::new("a.png"), Path::new("b.tif"), 4)
            .unwrap_err();
        assert!(matches!(err, EngineError::Codec(_)));
    }

    #[test]
    fn discovers_models_per_family() {
        let dir = tempfile::tempdir().unwrap();
        for f in ["b-x2.bin", "b-x2.param", "a-x4.bin", "a-x4.param", "lonely.bin"] {
            std::fs::write(dir.path().join(f), b"").unwrap();
        }
        let se = dir.path().join("models-se");
        std::fs::create_dir(&se).unwrap();
        for f in ["up2x-conservative.bin", "up2x-conservative.param", "up3x-denoise1x.param"] {
            std::fs::write(se.join(f), b"").unwrap();
        }

        assert_eq!(UpscalerFamily::RealEsrgan.discover_models(dir.path()).unwrap(), ["a-x4", "b-x2"]);
        assert_eq!(
            UpscalerFamily::RealCugan.discover_models(dir.path()).unwrap(),
            ["models-se#up2x-conservative"]
        );
    }
}
