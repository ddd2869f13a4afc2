//! The "at-most-one notification per completion run" edge detector. This is
//! deliberately *not* a counter: it watches one transition,
//! `(running+pending > 0) -> (running+pending = 0)`, and re-arms only once a
//! new job is admitted.

#[cfg(test)]
mod tests;

use parking_lot::Mutex;

struct State {
    /// Whether at least one job has finished since the gate last fired (or
    /// since startup). The gate only fires once this is true and the queue
    /// is quiescent.
    armed: bool,
    /// Whether the queue was non-quiescent the last time this gate observed
    /// it, used to detect the falling edge rather than just the level.
    was_active: bool,
}

/// Guards the notification sink call so concurrent workers finishing at the
/// same instant can't both observe quiescence and both fire.
pub struct NotificationGate {
    state: Mutex<State>,
}

impl NotificationGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                armed: false,
                was_active: false,
            }),
        }
    }

    /// Called whenever a job is admitted to the queue: re-arms the gate so a
    /// notification fires again for this new batch of work.
    pub fn on_job_admitted(&self) {
        let mut state = self.state.lock();
        state.was_active = true;
    }

    /// Called whenever a job reaches a terminal state.
    pub fn on_job_terminal(&self) {
        self.state.lock().armed = true;
    }

    /// Called after every worker-loop iteration with the queue's current
    /// `(running, pending)` counts. Returns `true` exactly once per
    /// quiescence edge, and only if at least one job finished since the last
    /// fire (or since startup).
    pub fn should_fire(&self, running: usize, pending: usize) -> bool {
        let mut state = self.state.lock();
        let active = running + pending > 0;

        let falling_edge = state.was_active && !active;
        state.was_active = active;

        if falling_edge && state.armed {
            state.armed = false;
            return true;
        }
        false
    }
}

impl Default for NotificationGate {
    fn default() -> Self {
        Self::new()
    }
}
