//! The scheduling loop and the handle the presentation layer keeps.
//!
//! One dedicated thread drains the queue. Between tasks it consults the
//! pause/cancel gate; after each task it settles progress accounting and
//! applies the ignore-error policy. Everything the presentation layer sees
//! arrives as `EngineEvent`s in the order it happened, ending with exactly
//! one terminal event followed by `Drained`.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, unbounded};
use tracing::{debug, error, info, warn};

use crate::core::{
    EngineEvent, GateDecision, ProgressTracker, ProgressValue, RunControl, RunOptions, RunReport,
    RunState, Task, TaskContext,
};
use crate::processing::ProcessRunner;
use crate::utils::{ConfigError, EngineError, EngineResult};
use crate::worker::{RunSink, TaskQueue};

const WORKER_THREAD_NAME: &str = "upscale-worker";

/// Start a run on its own worker thread.
///
/// `total_units` is the number of top-level units the queue represents
/// (one per input file); it grows as tasks fan out.
pub fn submit(queue: TaskQueue, total_units: usize, options: &RunOptions) -> EngineResult<RunHandle> {
    if queue.is_empty() {
        return Err(ConfigError::EmptyQueue.into());
    }

    let (events_tx, events_rx) = unbounded();
    let sink = RunSink::new(events_tx, options.log_path.as_deref())?;
    let control = RunControl::new();
    let progress = ProgressTracker::new(total_units.max(1));

    let runner = TaskRunner {
        queue,
        processes: ProcessRunner::new()?,
        progress: progress.clone(),
        control: control.clone(),
        sink,
        ignore_errors: options.ignore_errors,
    };

    let thread = thread::Builder::new()
        .name(WORKER_THREAD_NAME.into())
        .spawn(move || runner.run())
        .map_err(|e| EngineError::worker(format!("Failed to start worker thread: {e}")))?;

    info!("Run submitted ({} units)", total_units);
    Ok(RunHandle {
        control,
        progress,
        events: events_rx,
        thread,
    })
}

/// Presentation-side view of a running batch.
pub struct RunHandle {
    control: RunControl,
    progress: ProgressTracker,
    events: Receiver<EngineEvent>,
    thread: JoinHandle<RunReport>,
}

impl RunHandle {
    /// Pause before the next task; the in-flight task finishes first.
    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    /// Stop after the in-flight task and discard the rest.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// A clone of the pause/cancel gate; the CLI hands it to its Ctrl-C handler.
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn progress(&self) -> ProgressValue {
        self.progress.snapshot()
    }

    pub fn events(&self) -> &Receiver<EngineEvent> {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker and collect the run report.
    pub fn join(self) -> EngineResult<RunReport> {
        self.thread
            .join()
            .map_err(|payload| EngineError::worker(panic_message(payload.as_ref())))
    }
}

/// Owns the queue for the duration of one run.
struct TaskRunner {
    queue: TaskQueue,
    processes: ProcessRunner,
    progress: ProgressTracker,
    control: RunControl,
    sink: RunSink,
    ignore_errors: bool,
}

impl TaskRunner {
    fn run(mut self) -> RunReport {
        let started = Instant::now();
        let mut ignored_errors = 0usize;
        let mut failed_at = None;
        let mut state = RunState::Completed;

        self.sink.state(RunState::Running);
        self.sink.progress(self.progress.snapshot());

        while let Some(mut task) = self.queue.pop() {
            let mut paused = false;
            let decision = {
                let sink = &self.sink;
                self.control.wait_turn(|| {
                    paused = true;
                    sink.state(RunState::Paused);
                })
            };
            if decision == GateDecision::Cancel {
                task.abandon();
                state = RunState::Cancelled;
                break;
            }
            if paused {
                self.sink.state(RunState::Running);
            }

            let label = task.describe();
            debug!("Starting: {}", label);
            let (result, spawned, added_units) = self.execute(&mut task);

            match result {
                Ok(()) => {
                    if added_units > 0 {
                        self.sink.progress(self.progress.add_total(added_units));
                    }
                    self.queue.insert_next(spawned);
                    if task.completes_unit(true) {
                        self.sink.progress(self.progress.complete_unit());
                    }
                }
                Err(err) => {
                    for mut orphan in spawned {
                        orphan.abandon();
                    }
                    let position = self.progress.snapshot().completed_tasks + 1;
                    self.sink.line(&format!("[{}] {} failed: {}", err.kind(), label, err));

                    if self.ignore_errors {
                        warn!("Ignoring failure of {}: {}", label, err);
                        ignored_errors += 1;
                        if task.completes_unit(false) {
                            self.sink.progress(self.progress.complete_unit());
                        }
                    } else {
                        error!("{} failed, halting run: {}", label, err);
                        failed_at = Some((position, err));
                        state = RunState::Failed;
                        break;
                    }
                }
            }
        }

        let discarded = self.queue.abandon_all();
        if discarded > 0 {
            debug!("Discarded {} queued tasks", discarded);
        }
        self.finish(state, ignored_errors, failed_at, started)
    }

    /// Run one task, turning a panic into a worker error.
    fn execute(&mut self, task: &mut Task) -> (EngineResult<()>, Vec<Task>, usize) {
        let mut ctx = TaskContext::new(&self.processes, &self.progress, &mut self.sink);
        let result = catch_unwind(AssertUnwindSafe(|| task.execute(&mut ctx)))
            .unwrap_or_else(|payload| Err(EngineError::worker(panic_message(payload.as_ref()))));
        let (spawned, added_units) = ctx.finish();
        (result, spawned, added_units)
    }

    fn finish(
        mut self,
        state: RunState,
        ignored_errors: usize,
        failed_at: Option<(usize, EngineError)>,
        started: Instant,
    ) -> RunReport {
        let progress = self.progress.snapshot();
        let report = RunReport {
            state,
            progress,
            ignored_errors,
            failed_at,
            elapsed: started.elapsed(),
        };
        self.sink.line(&report.summary());

        match (&report.state, &report.failed_at) {
            (RunState::Failed, Some((task_index, error))) => self.sink.emit(EngineEvent::Failed {
                task_index: *task_index,
                total_tasks: progress.total_tasks,
                error: error.clone(),
            }),
            (RunState::Cancelled, _) => self.sink.emit(EngineEvent::Cancelled),
            _ => self.sink.emit(EngineEvent::Completed {
                had_ignored_errors: ignored_errors > 0,
                ignored_errors,
            }),
        }
        self.sink.state(report.state);

        self.sink.close();
        self.sink.emit(EngineEvent::Drained);
        info!("{}", report.summary());
        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Task panicked: {detail}")
}
