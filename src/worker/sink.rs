use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use crate::core::{EngineEvent, ProgressValue, RunState};
use crate::utils::{EngineResult, ensure_parent_dir};

/// Single textual sink for a run.
///
/// Every process output line and status line goes to the event channel in
/// order, and to the run log file when one is configured.
pub struct RunSink {
    events: Sender<EngineEvent>,
    log_file: Option<BufWriter<File>>,
}

impl RunSink {
    pub fn new(events: Sender<EngineEvent>, log_path: Option<&Path>) -> EngineResult<Self> {
        let log_file = match log_path {
            Some(path) => {
                ensure_parent_dir(path)?;
                Some(BufWriter::new(File::create(path)?))
            }
            None => None,
        };
        Ok(Self { events, log_file })
    }

    /// Record one line of output.
    pub fn line(&mut self, line: &str) {
        debug!("{}", line);
        if let Some(file) = self.log_file.as_mut() {
            if let Err(e) = writeln!(file, "{line}") {
                warn!("Run log write failed, disabling it: {}", e);
                self.log_file = None;
            }
        }
        self.emit(EngineEvent::Log { line: line.to_string() });
    }

    pub fn progress(&self, progress: ProgressValue) {
        self.emit(EngineEvent::Progress { progress });
    }

    pub fn state(&self, state: RunState) {
        self.emit(EngineEvent::StateChanged { state });
    }

    /// Send an event; a dropped receiver only means nobody is watching.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    /// Flush and close the run log.
    pub fn close(&mut self) {
        if let Some(mut file) = self.log_file.take() {
            if let Err(e) = file.flush() {
                warn!("Failed to flush run log: {}", e);
            }
        }
    }
}

impl Drop for RunSink {
    fn drop(&mut self) {
        self.close();
    }
}
