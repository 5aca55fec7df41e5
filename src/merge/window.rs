use std::time::Instant;

/// Lifecycle of a single debounce window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Scheduled,
    Executing,
    Done,
}

/// One debounce cycle: armed with a fire time, then fired exactly once.
///
/// A window is never re-armed. Rescheduling replaces it with a fresh window,
/// and once fired it is handed out by value so it cannot fire again.
#[derive(Debug, PartialEq, Eq)]
pub struct MergeWindow {
    id: u64,
    fire_at: Instant,
    state: WindowState,
}

impl MergeWindow {
    pub(crate) fn new(id: u64, fire_at: Instant) -> Self {
        Self { id, fire_at, state: WindowState::Scheduled }
    }

    #[inline] pub fn id(&self) -> u64 { self.id }

    #[inline] pub fn fire_at(&self) -> Instant { self.fire_at }

    #[inline] pub fn state(&self) -> WindowState { self.state }

    #[inline] pub(crate) fn is_due(&self, now: Instant) -> bool { now >= self.fire_at }

    pub(crate) fn begin(&mut self) {
        debug_assert_eq!(self.state, WindowState::Scheduled, "window {} fired twice", self.id);
        self.state = WindowState::Executing;
    }

    pub(crate) fn finish(&mut self) {
        debug_assert_eq!(self.state, WindowState::Executing, "window {} finished before firing", self.id);
        self.state = WindowState::Done;
    }
}
