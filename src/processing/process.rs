//! External process supervision.
//!
//! Spawns one program with an explicit argument vector (no shell), streams its
//! stdout and stderr line by line as they arrive, and blocks the calling worker
//! thread until the program exits. There is no timeout and no kill: a hung
//! program hangs the run until the operator cancels and the OS tears it down.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::Command;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::utils::{EngineError, EngineResult};

/// How an external program ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
    /// Always false: no timeout is enforced
    pub timed_out: bool,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    /// Map a non-zero exit onto [`EngineError::Exit`].
    pub fn into_result(self, program: &Path) -> EngineResult<()> {
        if self.success() {
            Ok(())
        } else {
            Err(EngineError::Exit {
                program: program_name(program),
                code: self.exit_code,
            })
        }
    }
}

/// Runs external programs on the worker thread.
///
/// Owns a current-thread runtime used only to multiplex the two output pipes.
pub struct ProcessRunner {
    runtime: Runtime,
}

impl ProcessRunner {
    pub fn new() -> EngineResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EngineError::worker(format!("Failed to build process runtime: {e}")))?;
        Ok(Self { runtime })
    }

    /// Run `program` with `args` and feed every output line to `on_line`.
    ///
    /// Spawn failures are an `Err`; a non-zero exit is an `Ok` outcome the
    /// caller inspects.
    pub fn run<F>(&self, program: &Path, args: &[OsString], mut on_line: F) -> EngineResult<ProcessOutcome>
    where
        F: FnMut(&str),
    {
        debug!("Spawning {} {:?}", program.display(), args);
        self.runtime.block_on(async {
            let mut child = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| EngineError::spawn(program.display().to_string(), &e))?;

            let stdout = child.stdout.take().map(|s| BufReader::new(s).lines());
            let stderr = child.stderr.take().map(|s| BufReader::new(s).lines());
            let mut out_open = stdout.is_some();
            let mut err_open = stderr.is_some();
            let (mut stdout, mut stderr) = (stdout, stderr);

            while out_open || err_open {
                tokio::select! {
                    line = next_line(&mut stdout), if out_open => {
                        match line {
                            Ok(Some(line)) => on_line(&line),
                            Ok(None) => out_open = false,
                            Err(e) => {
                                warn!("Dropping unreadable stdout of {}: {}", program.display(), e);
                                out_open = false;
                            }
                        }
                    }
                    line = next_line(&mut stderr), if err_open => {
                        match line {
                            Ok(Some(line)) => on_line(&line),
                            Ok(None) => err_open = false,
                            Err(e) => {
                                warn!("Dropping unreadable stderr of {}: {}", program.display(), e);
                                err_open = false;
                            }
                        }
                    }
                }
            }

            let status = child.wait().await?;
            debug!("{} exited with {:?}", program.display(), status.code());
            Ok::<_, EngineError>(ProcessOutcome {
                exit_code: status.code(),
                timed_out: false,
            })
        })
    }
}

async fn next_line<R>(lines: &mut Option<Lines<R>>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_line().await,
        None => Ok(None),
    }
}

fn program_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<OsString> {
        vec!["-c".into(), script.into()]
    }

    #[test]
    fn streams_lines_from_both_pipes() {
        let runner = ProcessRunner::new().unwrap();
        let mut lines = Vec::new();
        let outcome = runner
            .run(Path::new("/bin/sh"), &sh("echo one; echo two 1>&2; echo three"), |l| lines.push(l.to_string()))
            .unwrap();
        assert!(outcome.success());
        lines.sort();
        assert_eq!(lines, vec!["one", "three", "two"]);
    }

    #[test]
    fn non_zero_exit_is_an_outcome_not_an_error() {
        let runner = ProcessRunner::new().unwrap();
        let outcome = runner.run(Path::new("/bin/sh"), &sh("exit 3"), |_| {}).unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        let err = outcome.into_result(Path::new("/bin/sh")).unwrap_err();
        assert!(matches!(err, EngineError::Exit { code: Some(3), .. }));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let runner = ProcessRunner::new().unwrap();
        let err = runner
            .run(Path::new("/definitely/not/here"), &[], |_| {})
            .unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[test]
    fn arguments_are_not_shell_interpreted() {
        let runner = ProcessRunner::new().unwrap();
        let mut lines = Vec::new();
        runner
            .run(Path::new("/bin/echo"), &["$HOME; rm -rf /".into()], |l| lines.push(l.to_string()))
            .unwrap();
        assert_eq!(lines, vec!["$HOME; rm -rf /"]);
    }
}
