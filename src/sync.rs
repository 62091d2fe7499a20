//! Remote push scheduling.
//!
//! Every board change goes through [`PushScheduler::on_change`]. Local
//! changes (re)arm a debounce deadline; only the state at expiry is pushed.
//! A change that came from a remote snapshot is preceded by
//! [`PushScheduler::suppress_next`], which makes exactly the next change skip
//! the push so the remote update is not echoed back.
//!
//! ```text
//!            on_change (local)             deadline passed
//!   Idle ------------------------> Pending ---------------> Idle (push)
//!    ^  \                            |  ^ on_change (local): re-arm
//!    |   \ suppress_next             |  |
//!    |    v                          v  suppress_next
//!    +--- SuppressedOnce <-----------+
//!   on_change (any origin): no push
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    Idle,
    Pending { deadline: Instant },
    SuppressedOnce,
}

/// What a board change did to the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDecision {
    /// No active remote session, or it has not finished its initial load.
    LocalOnly,
    /// Change came from the remote; nothing will be pushed for it.
    Suppressed,
    /// A push is scheduled at the deadline.
    Armed(Instant),
}

#[derive(Debug, Clone)]
pub struct PushScheduler {
    window: Duration,
    state: PushState,
}

impl PushScheduler {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: PushState::Idle,
        }
    }

    pub fn state(&self) -> PushState {
        self.state
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// The next board change originates from the remote. Any pending push is
    /// dropped: the remote state wins.
    pub fn suppress_next(&mut self) {
        self.state = PushState::SuppressedOnce;
    }

    /// Record a board change. `push_enabled` is false when no remote session
    /// is ready to receive pushes.
    pub fn on_change(&mut self, now: Instant, push_enabled: bool) -> PushDecision {
        if self.state == PushState::SuppressedOnce {
            self.state = PushState::Idle;
            return PushDecision::Suppressed;
        }
        if !push_enabled {
            self.state = PushState::Idle;
            return PushDecision::LocalOnly;
        }
        let deadline = now + self.window;
        self.state = PushState::Pending { deadline };
        PushDecision::Armed(deadline)
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            PushState::Pending { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Consume a pending push whose deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.state {
            PushState::Pending { deadline } if now >= deadline => {
                self.state = PushState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Consume a pending push regardless of its deadline.
    pub fn take_pending(&mut self) -> bool {
        if matches!(self.state, PushState::Pending { .. }) {
            self.state = PushState::Idle;
            true
        } else {
            false
        }
    }

    pub fn cancel(&mut self) {
        self.state = PushState::Idle;
    }
}

/// Sync indicator shown next to the user menu.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncStatus {
    pub syncing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(1000);

    #[test]
    fn local_change_arms_and_rearms() {
        let start = Instant::now();
        let mut push = PushScheduler::new(WINDOW);
        assert_eq!(push.on_change(start, true), PushDecision::Armed(start + WINDOW));

        let later = start + Duration::from_millis(400);
        push.on_change(later, true);
        assert_eq!(push.deadline(), Some(later + WINDOW));
        assert!(!push.take_due(start + WINDOW));
        assert!(push.take_due(later + WINDOW));
        assert_eq!(push.state(), PushState::Idle);
    }

    #[test]
    fn suppression_applies_to_exactly_one_change() {
        let now = Instant::now();
        let mut push = PushScheduler::new(WINDOW);
        push.suppress_next();
        assert_eq!(push.on_change(now, true), PushDecision::Suppressed);
        assert_eq!(push.state(), PushState::Idle);
        assert!(matches!(push.on_change(now, true), PushDecision::Armed(_)));
    }

    #[test]
    fn suppression_drops_a_pending_push() {
        let now = Instant::now();
        let mut push = PushScheduler::new(WINDOW);
        push.on_change(now, true);
        push.suppress_next();
        push.on_change(now, true);
        assert!(!push.take_due(now + WINDOW * 2));
    }

    #[test]
    fn disabled_push_stays_local() {
        let now = Instant::now();
        let mut push = PushScheduler::new(WINDOW);
        push.on_change(now, true);
        assert_eq!(push.on_change(now, false), PushDecision::LocalOnly);
        assert_eq!(push.deadline(), None);
    }

    #[test]
    fn take_pending_flushes_early() {
        let now = Instant::now();
        let mut push = PushScheduler::new(WINDOW);
        assert!(!push.take_pending());
        push.on_change(now, true);
        assert!(push.take_pending());
        assert_eq!(push.state(), PushState::Idle);
    }
}
