use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use crate::utils::EngineResult;

/// Create the parent directory of `path` if it does not exist yet
pub fn ensure_parent_dir(path: &Path) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Get file name for log lines, falling back to the full path
pub fn extract_filename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Delete a scratch file, logging instead of failing.
///
/// Cleanup never masks the error of the step that owns the file.
pub fn remove_temp_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed temp file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove temp file {}: {}", path.display(), e),
    }
}

/// Delete a scratch directory and everything in it, best-effort.
pub fn remove_temp_dir(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!("Removed temp dir {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove temp dir {}: {}", path.display(), e),
    }
}

/// Reserve a fresh scratch path with the given extension.
///
/// The file is created empty and kept on disk so a later task can overwrite
/// it; ownership of the deletion passes to whichever task consumes it.
pub fn temp_path(extension: &str) -> EngineResult<PathBuf> {
    let file = tempfile::Builder::new()
        .prefix("upscale-")
        .suffix(&format!(".{extension}"))
        .tempfile()?;
    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}

/// Create a scratch directory that outlives this call.
pub fn temp_dir(prefix: &str) -> EngineResult<PathBuf> {
    let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
    Ok(dir.keep())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_paths_are_unique_and_cleanable() {
        let a = temp_path("png").unwrap();
        let b = temp_path("png").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.extension().unwrap(), "png");
        assert!(a.exists());
        remove_temp_file(&a);
        remove_temp_file(&b);
        assert!(!a.exists());
        // second removal is silent
        remove_temp_file(&a);
    }

    #[test]
    fn parent_dirs_are_created() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("x/y/out.png");
        ensure_parent_dir(&nested).unwrap();
        assert!(root.path().join("x/y").is_dir());
        assert_eq!(extract_filename(&nested), "out.png");
    }
}
