use std::sync::Arc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Snapshot of run progress.
///
/// Displayed progress is `(current_task_fraction + completed_tasks) / total_tasks`.
/// It only steps backwards when fan-out raises `total_tasks`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressValue {
    /// Fraction of the in-flight task, 0..=1
    pub current_task_fraction: f64,
    /// Top-level units fully finished
    pub completed_tasks: usize,
    /// Top-level units known so far
    pub total_tasks: usize,
}

impl ProgressValue {
    pub fn new(total_tasks: usize) -> Self {
        Self {
            current_task_fraction: 0.0,
            completed_tasks: 0,
            total_tasks,
        }
    }

    /// Overall progress in 0..=1
    pub fn fraction(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        ((self.current_task_fraction + self.completed_tasks as f64) / self.total_tasks as f64)
            .clamp(0.0, 1.0)
    }

    /// Progress percentage (0-100)
    pub fn percentage(&self) -> f64 {
        self.fraction() * 100.0
    }
}

/// Shared progress state written by the worker and read by the presentation layer.
///
/// The triple is swapped as one value under a lock, so readers never observe
/// a torn mix of old and new fields.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<Mutex<ProgressValue>>,
}

impl ProgressTracker {
    pub fn new(total_tasks: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProgressValue::new(total_tasks))),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> ProgressValue {
        *self.inner.lock()
    }

    /// Raise the in-flight fraction. Values are clamped to 0..=1 and a lower
    /// value than the current one is ignored.
    pub fn advance_fraction(&self, fraction: f64) -> ProgressValue {
        self.update(|p| {
            p.current_task_fraction = p.current_task_fraction.max(fraction.clamp(0.0, 1.0));
        })
    }

    /// Close one top-level unit and reset the in-flight fraction.
    pub fn complete_unit(&self) -> ProgressValue {
        self.update(|p| {
            p.current_task_fraction = 0.0;
            p.completed_tasks = (p.completed_tasks + 1).min(p.total_tasks);
        })
    }

    /// Register units discovered mid-run.
    ///
    /// The follow-ups that own the new units start from zero, so the
    /// in-flight fraction is reset in the same snapshot.
    pub fn add_total(&self, units: usize) -> ProgressValue {
        self.update(|p| {
            p.total_tasks += units;
            p.current_task_fraction = 0.0;
        })
    }

    fn update(&self, f: impl FnOnce(&mut ProgressValue)) -> ProgressValue {
        let mut guard = self.inner.lock();
        let mut next = *guard;
        f(&mut next);
        *guard = next;
        next
    }
}
