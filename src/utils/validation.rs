use std::path::{Path, PathBuf};
use tracing::debug;
use crate::core::{REConfigParams, RunOptions};
use crate::processing::resize::validate_request;
use crate::processing::{CommandTemplate, UpscalerFamily};
use crate::utils::{ConfigError, format_from_extension};

/// Validates everything a run needs before a single task is queued
pub fn validate_run(params: &REConfigParams, options: &RunOptions) -> Result<(), ConfigError> {
    validate_request(params.resize_mode, params.resize_mode_value)?;
    validate_quality(options.lossy_quality)?;
    if !params.custom_command.trim().is_empty() {
        CommandTemplate::parse(&params.custom_command)?;
    }
    resolve_upscaler(&params.upscaler)?;
    validate_model(params)?;
    Ok(())
}

/// Validates the input path: a folder, or a file with a supported extension
pub fn validate_input_path(path: &Path) -> Result<(), ConfigError> {
    if path.is_dir() {
        return Ok(());
    }
    if !path.is_file() || format_from_extension(path).is_err() {
        return Err(ConfigError::UnsupportedInput(path.to_path_buf()));
    }
    Ok(())
}

/// Validates lossy quality settings
pub fn validate_quality(quality: u8) -> Result<(), ConfigError> {
    if quality == 0 || quality > 100 {
        return Err(ConfigError::InvalidQuality(quality));
    }
    Ok(())
}

/// Locate the upscaler executable, searching `PATH` for bare names
pub fn resolve_upscaler(upscaler: &Path) -> Result<PathBuf, ConfigError> {
    let not_found = || ConfigError::UpscalerNotFound(upscaler.to_path_buf());

    if upscaler.components().count() > 1 {
        return if upscaler.is_file() { Ok(upscaler.to_path_buf()) } else { Err(not_found()) };
    }

    let search_path = std::env::var_os("PATH").ok_or_else(not_found)?;
    let found = std::env::split_paths(&search_path)
        .flat_map(|dir| executable_candidates(&dir, upscaler))
        .find(|candidate| candidate.is_file())
        .ok_or_else(not_found)?;
    debug!("Resolved upscaler {} -> {}", upscaler.display(), found.display());
    Ok(found)
}

fn executable_candidates(dir: &Path, name: &Path) -> Vec<PathBuf> {
    let plain = dir.join(name);
    if cfg!(windows) && name.extension().is_none() {
        vec![plain.with_extension("exe"), plain]
    } else {
        vec![plain]
    }
}

/// Validates that the configured model is present for the detected family
pub fn validate_model(params: &REConfigParams) -> Result<(), ConfigError> {
    let family = UpscalerFamily::detect(&params.upscaler);
    let models = family
        .discover_models(&params.model_dir)
        .map_err(|_| ConfigError::ModelNotFound(params.model.clone()))?;
    if !models.iter().any(|m| m == &params.model) {
        return Err(ConfigError::ModelNotFound(params.model.clone()));
    }
    Ok(())
}

/// Whether the lossy path should handle `output`
pub fn wants_lossy(output: &Path) -> bool {
    format_from_extension(output).is_ok_and(|f| f.supports_lossy())
}
