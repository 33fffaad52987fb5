//! Messages the worker sends to the presentation layer.

use std::time::Duration;
use serde::Serialize;
use crate::core::{ProgressValue, RunState};
use crate::utils::EngineError;

/// Event delivered over the worker → presentation channel, in the order it happened.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    /// One line of process output or an internal status line
    Log { line: String },
    /// Progress snapshot after an output line or task boundary
    Progress { progress: ProgressValue },
    /// State machine transition
    StateChanged { state: RunState },
    /// Queue finished without an unrecovered failure
    Completed {
        had_ignored_errors: bool,
        ignored_errors: usize,
    },
    /// A task failed with the ignore-error policy off
    Failed {
        /// 1-based position of the failing task among top-level units
        task_index: usize,
        total_tasks: usize,
        error: EngineError,
    },
    /// Stopped by an explicit cancel
    Cancelled,
    /// Fired exactly once per run, after every other event
    Drained,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub state: RunState,
    pub progress: ProgressValue,
    /// Errors logged and skipped under the ignore-error policy
    pub ignored_errors: usize,
    /// 1-based unit position and error when the run halted
    pub failed_at: Option<(usize, EngineError)>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        match (&self.state, &self.failed_at) {
            (RunState::Failed, Some((index, err))) => format!(
                "Failed at task {} of {}: {}",
                index, self.progress.total_tasks, err
            ),
            (RunState::Cancelled, _) => format!(
                "Cancelled after {} of {} tasks",
                self.progress.completed_tasks, self.progress.total_tasks
            ),
            _ if self.ignored_errors > 0 => format!(
                "Completed {} tasks with {} ignored errors in {:.2}s",
                self.progress.total_tasks,
                self.ignored_errors,
                self.elapsed.as_secs_f64()
            ),
            _ => format!(
                "Completed {} tasks in {:.2}s",
                self.progress.total_tasks,
                self.elapsed.as_secs_f64()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(state: RunState, ignored: usize, failed_at: Option<(usize, EngineError)>) -> RunReport {
        RunReport {
            state,
            progress: ProgressValue { current_task_fraction: 0.0, completed_tasks: 2, total_tasks: 5 },
            ignored_errors: ignored,
            failed_at,
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn summaries_cover_each_outcome() {
        assert_eq!(report(RunState::Completed, 0, None).summary(), "Completed 5 tasks in 1.50s");
        assert!(report(RunState::Completed, 2, None).summary().contains("2 ignored errors"));
        let failed = report(RunState::Failed, 0, Some((3, EngineError::codec("bad frame"))));
        assert_eq!(failed.summary(), "Failed at task 3 of 5: Codec error: bad frame");
        assert!(report(RunState::Cancelled, 0, None).summary().starts_with("Cancelled after 2"));
    }

    #[test]
    fn events_serialize_tagged() {
        let json = serde_json::to_value(EngineEvent::Completed { had_ignored_errors: true, ignored_errors: 1 }).unwrap();
        assert_eq!(json["type"], "completed");
        assert_eq!(json["hadIgnoredErrors"], true);
        assert_eq!(json["ignoredErrors"], 1);

        let failed = serde_json::to_value(EngineEvent::Failed {
            task_index: 2,
            total_tasks: 3,
            error: EngineError::codec("bad frame"),
        })
        .unwrap();
        assert_eq!(failed["type"], "failed");
        assert_eq!(failed["taskIndex"], 2);
        assert_eq!(failed["totalTasks"], 3);
    }
}
