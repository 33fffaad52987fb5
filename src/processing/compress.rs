//! Compression steps that run after an upscale.
//!
//! Both consume a scratch file produced by the upscale step. The scratch
//! file is deleted only when compression succeeds; on failure it is kept so
//! the intermediate result can be recovered from the temp directory. A step
//! discarded before it runs deletes it.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::TaskContext;
use crate::processing::codec::encode_lossy;
use crate::processing::template::CommandTemplate;
use crate::utils::{EngineError, EngineResult, ensure_parent_dir, extract_filename, remove_temp_file};

/// Run a user-supplied command template on `input`.
#[derive(Debug, Clone)]
pub struct CustomCompressTask {
    pub input: PathBuf,
    pub output: PathBuf,
    pub template: CommandTemplate,
    pub delete_input_on_success: bool,
}

impl CustomCompressTask {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, template: CommandTemplate) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            template,
            delete_input_on_success: true,
        }
    }

    pub fn describe(&self) -> String {
        format!("Compress {} with `{}`", self.input.display(), self.template.source())
    }

    pub fn execute(&mut self, ctx: &mut TaskContext<'_>) -> EngineResult<()> {
        require_upscaled(&self.input)?;
        ensure_parent_dir(&self.output)?;
        let (program, args) = self.template.expand(&self.input, &self.output);
        ctx.log(format!("Compressing {} -> {}", extract_filename(&self.input), extract_filename(&self.output)));

        // Arbitrary tools print no progress we could parse
        let outcome = ctx.run_process(&program, &args, |_| None)?;
        if let Err(e) = outcome.into_result(&program) {
            warn!("Compression failed, keeping {}", self.input.display());
            return Err(e);
        }

        if self.delete_input_on_success {
            remove_temp_file(&self.input);
        }
        ctx.set_fraction(1.0);
        info!("Compressed {} -> {}", self.input.display(), self.output.display());
        Ok(())
    }

    pub fn abandon(&mut self) {
        remove_temp_file(&self.input);
    }
}

/// Re-encode `input` with a built-in lossy codec at `quality`.
#[derive(Debug, Clone)]
pub struct LossyCompressTask {
    pub input: PathBuf,
    pub output: PathBuf,
    pub quality: u8,
    pub delete_input_on_success: bool,
}

impl LossyCompressTask {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, quality: u8) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            quality,
            delete_input_on_success: true,
        }
    }

    pub fn describe(&self) -> String {
        format!("Encode {} at quality {}", self.output.display(), self.quality)
    }

    pub fn execute(&mut self, ctx: &mut TaskContext<'_>) -> EngineResult<()> {
        ctx.log(format!(
            "Encoding {} (quality {})",
            extract_filename(&self.output),
            self.quality
        ));
        require_upscaled(&self.input)?;
        if let Err(e) = encode_lossy(&self.input, &self.output, self.quality) {
            warn!("Lossy encode failed, keeping {}", self.input.display());
            return Err(e);
        }

        if self.delete_input_on_success {
            remove_temp_file(&self.input);
        }
        ctx.set_fraction(1.0);
        Ok(())
    }

    pub fn abandon(&mut self) {
        remove_temp_file(&self.input);
    }
}

/// A missing or empty input means the upstream upscale did not write it.
fn require_upscaled(input: &Path) -> EngineResult<()> {
    match std::fs::metadata(input) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(EngineError::io(format!("{} is empty", input.display()))),
        Err(e) => Err(EngineError::io(format!("{}: {}", input.display(), e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_missing_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("placeholder.png");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(require_upscaled(&empty), Err(EngineError::Io(_))));
        assert!(matches!(require_upscaled(&dir.path().join("gone.png")), Err(EngineError::Io(_))));

        std::fs::write(&empty, b"\x89PNG").unwrap();
        assert!(require_upscaled(&empty).is_ok());
    }
}
