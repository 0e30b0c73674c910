use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind};

use crate::countdown::{FocusTimer, PreStartTimer};
use crate::flow::{Action, ActionKind, FlowState, Session};
use crate::store::Transition;

/// What the shell loop wakes up for.
#[derive(Clone, Debug)]
pub enum FlowEvent {
    Key(KeyEvent),
    Resize,
    /// Wall time since the previous tick.
    Tick(Duration),
}

pub trait FlowEventSource: Send + 'static {
    /// Blocks for up to `timeout`.
    fn recv_timeout(&self, timeout: Duration) -> Result<FlowEvent, RecvTimeoutError>;
}

/// Key presses and resizes read from crossterm on a background thread.
pub struct CrosstermEventSource {
    rx: Receiver<FlowEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                // presses only, releases would fire a control twice
                Ok(CtEvent::Key(key)) if key.kind == KeyEventKind::Press => FlowEvent::Key(key),
                Ok(CtEvent::Resize(_, _)) => FlowEvent::Resize,
                Ok(_) => continue,
                Err(_) => break,
            };
            if tx.send(forwarded).is_err() {
                break;
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<FlowEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Events pushed through a channel, for headless drivers.
pub struct ChannelEventSource {
    rx: Receiver<FlowEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<FlowEvent>) -> Self {
        Self { rx }
    }
}

impl FlowEventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<FlowEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Interleaves input with ticks at a fixed interval.
///
/// Ticks are scheduled against the clock, so a stream of key presses never
/// delays the countdowns.
pub struct Runner<E: FlowEventSource> {
    source: E,
    interval: Duration,
    last_tick: Instant,
}

impl<E: FlowEventSource> Runner<E> {
    pub fn new(source: E, interval: Duration) -> Self {
        Self {
            source,
            interval,
            last_tick: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn step(&mut self) -> FlowEvent {
        let due = self.interval.saturating_sub(self.last_tick.elapsed());
        if !due.is_zero() {
            match self.source.recv_timeout(due) {
                Ok(ev) => return ev,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(due),
            }
        }

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick);
        self.last_tick = now;
        FlowEvent::Tick(elapsed)
    }
}

/// The countdowns that dispatch TIMER_ZERO and END_FOCUS on the user's behalf.
///
/// At most one is armed: the pre-start countdown while in PRE_START, the focus
/// block while in FOCUS_RUNNING.
#[derive(Debug, Clone)]
pub struct SessionTimers {
    countdown_secs: u64,
    pre_start: Option<PreStartTimer>,
    focus: Option<FocusTimer>,
}

impl SessionTimers {
    /// Armed for a fresh session.
    pub fn new(countdown_secs: u64) -> Self {
        Self {
            countdown_secs,
            pre_start: Some(PreStartTimer::new(countdown_secs)),
            focus: None,
        }
    }

    pub fn pre_start_remaining(&self) -> Option<f64> {
        self.pre_start.as_ref().map(PreStartTimer::seconds_remaining)
    }

    pub fn focus_remaining(&self) -> Option<f64> {
        self.focus.as_ref().map(FocusTimer::seconds_remaining)
    }

    /// Re-arms after `change` was applied and produced `session`.
    pub fn follow(&mut self, change: &Transition, session: &Session) {
        if !change.changed_state() && change.action != ActionKind::Reset {
            return;
        }
        self.pre_start = (change.to == FlowState::PreStart).then(|| PreStartTimer::new(self.countdown_secs));
        self.focus = FocusTimer::for_session(session);
        tracing::trace!(
            pre_start = self.pre_start.is_some(),
            focus = self.focus.is_some(),
            "timers re-armed"
        );
    }

    /// Advances whichever timer is armed; `now` stamps an expiring focus block.
    pub fn on_tick(&mut self, elapsed: Duration, now: DateTime<Local>) -> Vec<Action> {
        let mut due = Vec::new();
        if let Some(timer) = self.pre_start.as_mut() {
            due.extend(timer.on_tick(elapsed));
        }
        if let Some(timer) = self.focus.as_mut() {
            due.extend(timer.on_tick(elapsed, now));
        }
        due
    }
}
