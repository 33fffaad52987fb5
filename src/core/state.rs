//! Run state machine and the pause/cancel gate shared with the presentation layer.

use std::sync::Arc;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Lifecycle of one run.
///
/// `Idle → Running → {Paused ⇄ Running} → {Completed | Failed | Cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Default)]
struct Gate {
    paused: bool,
    cancelled: bool,
}

/// What the worker should do before starting the next task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Cancel,
}

/// Cooperative pause/cancel signal.
///
/// The presentation layer flips the flags; the worker consults them only
/// between tasks, so an in-flight task always runs to completion.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    inner: Arc<(Mutex<Gate>, Condvar)>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a pause after the current task.
    pub fn pause(&self) {
        let (lock, _) = &*self.inner;
        lock.lock().paused = true;
        debug!("Pause requested");
    }

    /// Wake a paused worker.
    pub fn resume(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().paused = false;
        cvar.notify_all();
        debug!("Resume requested");
    }

    /// Stop after the current task. Also releases a paused worker.
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().cancelled = true;
        cvar.notify_all();
        debug!("Cancel requested");
    }

    pub fn is_paused(&self) -> bool {
        self.inner.0.lock().paused
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.0.lock().cancelled
    }

    /// Block while paused. `on_pause` fires once if the worker actually blocks.
    pub fn wait_turn(&self, on_pause: impl FnOnce()) -> GateDecision {
        let (lock, cvar) = &*self.inner;
        let mut gate = lock.lock();
        if gate.cancelled {
            return GateDecision::Cancel;
        }
        if gate.paused {
            on_pause();
            while gate.paused && !gate.cancelled {
                cvar.wait(&mut gate);
            }
        }
        if gate.cancelled {
            GateDecision::Cancel
        } else {
            GateDecision::Proceed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn unpaused_gate_proceeds() {
        let control = RunControl::new();
        assert_eq!(control.wait_turn(|| panic!("not paused")), GateDecision::Proceed);
    }

    #[test]
    fn resume_releases_blocked_worker() {
        let control = RunControl::new();
        control.pause();
        let blocked = Arc::new(AtomicBool::new(false));

        let worker = {
            let control = control.clone();
            let blocked = blocked.clone();
            thread::spawn(move || control.wait_turn(|| blocked.store(true, Ordering::SeqCst)))
        };

        while !blocked.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(5));
        }
        control.resume();
        assert_eq!(worker.join().unwrap(), GateDecision::Proceed);
    }

    #[test]
    fn cancel_releases_paused_worker() {
        let control = RunControl::new();
        control.pause();
        let worker = {
            let control = control.clone();
            thread::spawn(move || control.wait_turn(|| {}))
        };
        thread::sleep(Duration::from_millis(20));
        control.cancel();
        assert_eq!(worker.join().unwrap(), GateDecision::Cancel);
        assert!(control.is_cancelled());
    }
}
