use chrono::{DateTime, Local};
use std::time::Duration;

use crate::flow::{Action, FlowState, Session};

/// A seconds countdown advanced by the runner's tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Countdown {
    seconds_remaining: f64,
    fired: bool,
}

impl Countdown {
    pub fn new(secs: f64) -> Self {
        Self {
            seconds_remaining: secs.max(0.0),
            fired: false,
        }
    }

    pub fn seconds_remaining(&self) -> f64 {
        self.seconds_remaining.max(0.0)
    }

    pub fn on_tick(&mut self, elapsed: Duration) {
        self.seconds_remaining -= elapsed.as_secs_f64();
    }

    pub fn expired(&self) -> bool {
        self.seconds_remaining <= 0.0
    }

    /// True exactly once, on the first call after the countdown runs out.
    pub fn take_expired(&mut self) -> bool {
        if self.expired() && !self.fired {
            self.fired = true;
            return true;
        }
        false
    }
}

/// Counts down the pre-start ritual and fires TIMER_ZERO.
#[derive(Debug, Clone)]
pub struct PreStartTimer {
    countdown: Countdown,
}

impl PreStartTimer {
    pub fn new(secs: u64) -> Self {
        Self {
            countdown: Countdown::new(secs as f64),
        }
    }

    pub fn seconds_remaining(&self) -> f64 {
        self.countdown.seconds_remaining()
    }

    pub fn on_tick(&mut self, elapsed: Duration) -> Option<Action> {
        self.countdown.on_tick(elapsed);
        if self.countdown.take_expired() {
            tracing::debug!("pre-start countdown reached zero");
            return Some(Action::TimerZero);
        }
        None
    }
}

/// Counts down the planned focus block and fires END_FOCUS.
#[derive(Debug, Clone)]
pub struct FocusTimer {
    countdown: Countdown,
}

/// Least time left on the clock of a resumed block.
const RESUME_GRACE_SECS: f64 = 60.0;

impl FocusTimer {
    /// Arms a timer for a session in FOCUS_RUNNING.
    ///
    /// A block resumed with BACK from CHECKPOINT keeps its `end_time`, so only
    /// the planned time not yet spent is left on the clock.
    pub fn for_session(session: &Session) -> Option<Self> {
        if session.state() != FlowState::FocusRunning {
            return None;
        }
        let planned = f64::from(session.duration_min()?) * 60.0;
        let spent = match (session.start_time(), session.end_time()) {
            (Some(start), Some(end)) => Some((end - start).num_seconds().max(0) as f64),
            _ => None,
        };
        let secs = match spent {
            Some(spent) => (planned - spent).max(RESUME_GRACE_SECS),
            None => planned,
        };
        Some(Self {
            countdown: Countdown::new(secs),
        })
    }

    pub fn seconds_remaining(&self) -> f64 {
        self.countdown.seconds_remaining()
    }

    /// `now` becomes the END_FOCUS timestamp when the block runs out.
    pub fn on_tick(&mut self, elapsed: Duration, now: DateTime<Local>) -> Option<Action> {
        self.countdown.on_tick(elapsed);
        if self.countdown.take_expired() {
            tracing::debug!("focus block elapsed");
            return Some(Action::EndFocus { at: now });
        }
        None
    }
}
