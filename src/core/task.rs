//! Task definition: the unit of work the runner executes.

use std::ffi::OsString;
use std::path::Path;

use crate::core::ProgressTracker;
use crate::processing::{
    CustomCompressTask, LossyCompressTask, MergeFramesTask, ProcessOutcome, ProcessRunner,
    SplitAnimatedImageTask, UpscaleTask,
};
use crate::utils::EngineResult;
use crate::worker::RunSink;

/// A pipeline step injected from outside the engine.
pub trait PipelineStep: Send {
    /// Short label for log lines
    fn describe(&self) -> String;

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> EngineResult<()>;

    /// Whether finishing this step closes one progress unit
    fn completes_unit(&self, _succeeded: bool) -> bool {
        true
    }

    /// Release owned scratch files when the run stops before this step runs
    fn abandon(&mut self) {}
}

/// One unit of work in a run queue.
pub enum Task {
    Upscale(UpscaleTask),
    SplitAnimatedImage(SplitAnimatedImageTask),
    MergeFrames(MergeFramesTask),
    CustomCompress(CustomCompressTask),
    LossyCompress(LossyCompressTask),
    Custom(Box<dyn PipelineStep>),
}

impl Task {
    pub fn describe(&self) -> String {
        match self {
            Self::Upscale(t) => t.describe(),
            Self::SplitAnimatedImage(t) => t.describe(),
            Self::MergeFrames(t) => t.describe(),
            Self::CustomCompress(t) => t.describe(),
            Self::LossyCompress(t) => t.describe(),
            Self::Custom(t) => t.describe(),
        }
    }

    pub fn execute(&mut self, ctx: &mut TaskContext<'_>) -> EngineResult<()> {
        match self {
            Self::Upscale(t) => t.execute(ctx),
            Self::SplitAnimatedImage(t) => t.execute(ctx),
            Self::MergeFrames(t) => t.execute(ctx),
            Self::CustomCompress(t) => t.execute(ctx),
            Self::LossyCompress(t) => t.execute(ctx),
            Self::Custom(t) => t.execute(ctx),
        }
    }

    /// Whether this task closes a progress unit.
    ///
    /// An upscale feeding a compress step leaves the unit to the compress
    /// step. A successful split hands its unit to the frames it spawns.
    pub fn completes_unit(&self, succeeded: bool) -> bool {
        match self {
            Self::Upscale(t) => t.closes_unit,
            Self::SplitAnimatedImage(_) => !succeeded,
            Self::MergeFrames(_) | Self::CustomCompress(_) | Self::LossyCompress(_) => true,
            Self::Custom(t) => t.completes_unit(succeeded),
        }
    }

    /// Best-effort cleanup for a task discarded without running.
    pub fn abandon(&mut self) {
        match self {
            Self::MergeFrames(t) => t.abandon(),
            Self::CustomCompress(t) => t.abandon(),
            Self::LossyCompress(t) => t.abandon(),
            Self::Custom(t) => t.abandon(),
            _ => {}
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Task").field(&self.describe()).finish()
    }
}

/// What a running task may touch: the process runner, progress, the run
/// sink, and the slot right after itself in the queue.
pub struct TaskContext<'a> {
    runner: &'a ProcessRunner,
    progress: &'a ProgressTracker,
    sink: &'a mut RunSink,
    spawned: Vec<Task>,
    added_units: usize,
}

impl<'a> TaskContext<'a> {
    pub fn new(runner: &'a ProcessRunner, progress: &'a ProgressTracker, sink: &'a mut RunSink) -> Self {
        Self {
            runner,
            progress,
            sink,
            spawned: Vec::new(),
            added_units: 0,
        }
    }

    /// Write a status line to the run log.
    pub fn log(&mut self, line: impl AsRef<str>) {
        self.sink.line(line.as_ref());
    }

    /// Report the fraction of this task that is done. Progress never moves
    /// backwards within a unit, so a lower value than before is ignored.
    pub fn set_fraction(&mut self, fraction: f64) {
        let progress = self.progress.advance_fraction(fraction);
        self.sink.progress(progress);
    }

    /// Queue a follow-up task. Follow-ups run right after this task, in the
    /// order they were queued, ahead of anything already waiting.
    pub fn enqueue(&mut self, task: Task) {
        self.spawned.push(task);
    }

    /// Announce extra progress units discovered by this task.
    pub fn add_units(&mut self, units: usize) {
        self.added_units += units;
    }

    /// Run an external program, mirroring its output to the run log.
    ///
    /// `on_line` may turn a line into a task fraction.
    pub fn run_process<F>(&mut self, program: &Path, args: &[OsString], mut on_line: F) -> EngineResult<ProcessOutcome>
    where
        F: FnMut(&str) -> Option<f64>,
    {
        let runner = self.runner;
        let progress = self.progress;
        let sink = &mut *self.sink;
        runner.run(program, args, |line| {
            sink.line(line);
            if let Some(fraction) = on_line(line) {
                sink.progress(progress.advance_fraction(fraction));
            }
        })
    }

    /// Hand the follow-ups and added unit count back to the runner.
    pub(crate) fn finish(self) -> (Vec<Task>, usize) {
        (self.spawned, self.added_units)
    }
}
