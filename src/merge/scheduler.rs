use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use tracing::{debug, trace};

use crate::merge::MergeWindow;

/// Observable state of the merge cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePhase {
    Idle,
    Scheduled { fire_at: Instant },
    Executing { rerun_requested: bool },
}

/// What a schedule request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    /// A new window was armed from idle.
    Armed,
    /// A pending window was cancelled and replaced by a later (or earlier) one.
    Rearmed,
    /// A pass is executing; a rerun will follow it.
    Queued,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Scheduled(MergeWindow),
    Executing { window: u64, rerun: bool },
}

#[derive(Debug)]
struct State {
    phase: Phase,
    next_window: u64,
    cleanup_at: Option<Instant>,
}

/// Debounces merge requests into one pass per quiet period.
///
/// At most one window is pending. Requests while a pass executes never start a
/// second pass; they are remembered and turned into an immediate follow-up
/// window when the running pass completes.
#[derive(Debug)]
pub struct MergeScheduler {
    state: Mutex<State>,
}

impl Default for MergeScheduler {
    fn default() -> Self {
        Self { state: Mutex::new(State { phase: Phase::Idle, next_window: 0, cleanup_at: None }) }
    }
}

impl MergeScheduler {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm (or re-arm) the pending window to fire `delay` after `now`.
    pub fn schedule_merge(&self, now: Instant, delay: Duration) -> Scheduled {
        let mut state = self.lock();
        if let Phase::Executing { window, rerun } = &mut state.phase {
            trace!(window = *window, "merge requested while executing, queueing rerun");
            *rerun = true;
            return Scheduled::Queued
        }

        let id = state.next_window;
        state.next_window += 1;
        let window = MergeWindow::new(id, now + delay);
        match std::mem::replace(&mut state.phase, Phase::Scheduled(window)) {
            Phase::Scheduled(cancelled) => {
                debug!(cancelled = cancelled.id(), window = id, delay_ms = delay.as_millis() as u64, "merge rescheduled");
                Scheduled::Rearmed
            }
            _ => {
                debug!(window = id, delay_ms = delay.as_millis() as u64, "merge scheduled");
                Scheduled::Armed
            }
        }
    }

    /// Fire the pending window if its time has come, entering the executing phase.
    /// The caller must hand the window back through `complete`.
    pub fn take_due(&self, now: Instant) -> Option<MergeWindow> {
        let mut state = self.lock();
        match &state.phase {
            Phase::Scheduled(window) if window.is_due(now) => {}
            _ => return None,
        }
        let Phase::Scheduled(mut window) = std::mem::replace(&mut state.phase, Phase::Idle) else {
            return None
        };
        window.begin();
        state.phase = Phase::Executing { window: window.id(), rerun: false };
        Some(window)
    }

    /// Finish the pass started by `window`. If requests arrived meanwhile, a
    /// follow-up window is armed to fire at `now`. Returns true in that case.
    pub fn complete(&self, mut window: MergeWindow, now: Instant) -> bool {
        window.finish();
        let mut state = self.lock();
        let rerun = match state.phase {
            Phase::Executing { window: running, rerun } => {
                debug_assert_eq!(running, window.id(), "completed a window that was not executing");
                rerun
            }
            _ => false,
        };

        if rerun {
            let id = state.next_window;
            state.next_window += 1;
            debug!(after = window.id(), window = id, "rerun scheduled after busy pass");
            state.phase = Phase::Scheduled(MergeWindow::new(id, now));
        } else {
            state.phase = Phase::Idle;
        }
        rerun
    }

    /// Arm the cleanup deadline, replacing an earlier one.
    pub fn schedule_cleanup(&self, at: Instant) {
        self.lock().cleanup_at = Some(at);
    }

    /// Consume the cleanup deadline if it has passed.
    pub fn take_due_cleanup(&self, now: Instant) -> bool {
        let mut state = self.lock();
        match state.cleanup_at {
            Some(at) if now >= at => { state.cleanup_at = None; true }
            _ => false,
        }
    }

    /// Earliest instant at which `take_due` or `take_due_cleanup` may succeed.
    pub fn next_deadline(&self) -> Option<Instant> {
        let state = self.lock();
        let merge = match &state.phase {
            Phase::Scheduled(window) => Some(window.fire_at()),
            _ => None,
        };
        [merge, state.cleanup_at].into_iter().flatten().min()
    }

    pub fn phase(&self) -> MergePhase {
        match &self.lock().phase {
            Phase::Idle => MergePhase::Idle,
            Phase::Scheduled(window) => MergePhase::Scheduled { fire_at: window.fire_at() },
            Phase::Executing { rerun, .. } => MergePhase::Executing { rerun_requested: *rerun },
        }
    }
}
