use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phase of a focus session.
///
/// The first nine variants form the guarded session flow. The remaining five
/// belong to UI shells that park a session outside the flow; the machine only
/// ever leaves them through [`Action::Reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    PreStart,
    LockIn,
    FocusSetup,
    FocusRunning,
    Checkpoint,
    SelfRate,
    Recap,
    RewardGate,
    PostActions,
    VaultClosed,
    Dashboard,
    Questionnaire,
    Preparation,
    ScrollDemo,
}

impl FlowState {
    pub const ALL: [FlowState; 14] = [
        FlowState::PreStart,
        FlowState::LockIn,
        FlowState::FocusSetup,
        FlowState::FocusRunning,
        FlowState::Checkpoint,
        FlowState::SelfRate,
        FlowState::Recap,
        FlowState::RewardGate,
        FlowState::PostActions,
        FlowState::VaultClosed,
        FlowState::Dashboard,
        FlowState::Questionnaire,
        FlowState::Preparation,
        FlowState::ScrollDemo,
    ];

    /// True for states on the guarded session flow, false for shell states.
    pub fn is_core(self) -> bool {
        !matches!(
            self,
            FlowState::VaultClosed
                | FlowState::Dashboard
                | FlowState::Questionnaire
                | FlowState::Preparation
                | FlowState::ScrollDemo
        )
    }
}

/// Self-assessment given at the end of a session. Serialized as its star count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u8")]
pub enum Rating {
    One,
    Two,
    Three,
}

impl Rating {
    pub fn from_stars(stars: u8) -> Option<Self> {
        match stars {
            1 => Some(Rating::One),
            2 => Some(Rating::Two),
            3 => Some(Rating::Three),
            _ => None,
        }
    }

    pub fn stars(self) -> u8 {
        match self {
            Rating::One => 1,
            Rating::Two => 2,
            Rating::Three => 3,
        }
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> u8 {
        rating.stars()
    }
}

/// Command dispatched into [`transition`].
///
/// Timestamps are supplied by the caller so the machine never reads a clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Ready,
    TimerZero,
    PickType(String),
    SetTarget(String),
    SetDuration(u32),
    StartFocus { at: DateTime<Local> },
    AddNote(String),
    EndFocus { at: DateTime<Local> },
    AttachProof(String),
    SkipCheckpoint,
    RateSession(Rating),
    Continue,
    SaveSummary,
    Discard,
    ClaimAward,
    Back,
    Reset,
}

/// Payload-free tag of an [`Action`], used for diagnostics and control lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Ready,
    TimerZero,
    PickType,
    SetTarget,
    SetDuration,
    StartFocus,
    AddNote,
    EndFocus,
    AttachProof,
    SkipCheckpoint,
    RateSession,
    Continue,
    SaveSummary,
    Discard,
    ClaimAward,
    Back,
    Reset,
}

impl ActionKind {
    pub const ALL: [ActionKind; 17] = [
        ActionKind::Ready,
        ActionKind::TimerZero,
        ActionKind::PickType,
        ActionKind::SetTarget,
        ActionKind::SetDuration,
        ActionKind::StartFocus,
        ActionKind::AddNote,
        ActionKind::EndFocus,
        ActionKind::AttachProof,
        ActionKind::SkipCheckpoint,
        ActionKind::RateSession,
        ActionKind::Continue,
        ActionKind::SaveSummary,
        ActionKind::Discard,
        ActionKind::ClaimAward,
        ActionKind::Back,
        ActionKind::Reset,
    ];
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Ready => ActionKind::Ready,
            Action::TimerZero => ActionKind::TimerZero,
            Action::PickType(_) => ActionKind::PickType,
            Action::SetTarget(_) => ActionKind::SetTarget,
            Action::SetDuration(_) => ActionKind::SetDuration,
            Action::StartFocus { .. } => ActionKind::StartFocus,
            Action::AddNote(_) => ActionKind::AddNote,
            Action::EndFocus { .. } => ActionKind::EndFocus,
            Action::AttachProof(_) => ActionKind::AttachProof,
            Action::SkipCheckpoint => ActionKind::SkipCheckpoint,
            Action::RateSession(_) => ActionKind::RateSession,
            Action::Continue => ActionKind::Continue,
            Action::SaveSummary => ActionKind::SaveSummary,
            Action::Discard => ActionKind::Discard,
            Action::ClaimAward => ActionKind::ClaimAward,
            Action::Back => ActionKind::Back,
            Action::Reset => ActionKind::Reset,
        }
    }
}

/// Raised for every action that is not legal from the current state,
/// including guard failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {action} is not allowed from {from}")]
pub struct InvalidTransition {
    pub from: FlowState,
    pub action: ActionKind,
}

/// One focus-session attempt. Only [`transition`] produces new values.
///
/// Serialize only: a session cannot be loaded from outside the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    state: FlowState,
    ready_pressed: bool,
    multiplier_penalty: bool,
    target: Option<String>,
    duration_min: Option<u32>,
    start_time: Option<DateTime<Local>>,
    end_time: Option<DateTime<Local>>,
    notes: Option<String>,
    proof: Option<String>,
    rating: Option<Rating>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: FlowState::PreStart,
            ready_pressed: false,
            multiplier_penalty: false,
            target: None,
            duration_min: None,
            start_time: None,
            end_time: None,
            notes: None,
            proof: None,
            rating: None,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh session parked at one of the shell states. Returns `None` for
    /// states on the session flow, which are only reachable by transition.
    pub fn shell(state: FlowState) -> Option<Self> {
        if state.is_core() {
            return None;
        }
        Some(Self {
            state,
            ..Self::default()
        })
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn ready_pressed(&self) -> bool {
        self.ready_pressed
    }

    pub fn multiplier_penalty(&self) -> bool {
        self.multiplier_penalty
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn duration_min(&self) -> Option<u32> {
        self.duration_min
    }

    pub fn start_time(&self) -> Option<DateTime<Local>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Local>> {
        self.end_time
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn proof(&self) -> Option<&str> {
        self.proof.as_deref()
    }

    pub fn rating(&self) -> Option<Rating> {
        self.rating
    }

    /// Reward multiplier earned by pressing Ready before the countdown ran out.
    pub fn multiplier(&self) -> u8 {
        if self.multiplier_penalty {
            1
        } else {
            2
        }
    }

    /// Whether the START_FOCUS guard holds: a non-blank target and a non-zero duration.
    pub fn ready_to_focus(&self) -> bool {
        let has_target = self.target().is_some_and(|t| !t.trim().is_empty());
        let has_duration = self.duration_min.is_some_and(|d| d > 0);
        has_target && has_duration
    }

    /// Whole minutes between start and end, when both markers are set.
    pub fn focused_minutes(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_minutes().max(0)),
            _ => None,
        }
    }
}

/// Computes the session that follows `action`, or rejects it.
///
/// Never mutates `session`; a rejected action leaves the caller's value as it was.
pub fn transition(session: &Session, action: &Action) -> Result<Session, InvalidTransition> {
    let reject = || InvalidTransition {
        from: session.state,
        action: action.kind(),
    };

    let mut next = session.clone();
    match (session.state, action) {
        (_, Action::Reset) => return Ok(Session::new()),

        (FlowState::PreStart, Action::Ready) => next.ready_pressed = true,
        (FlowState::PreStart, Action::TimerZero) => {
            // captured once here, never re-derived
            next.multiplier_penalty = !session.ready_pressed;
            next.state = FlowState::LockIn;
        }

        (FlowState::LockIn, Action::PickType(kind)) => {
            next.target = Some(kind.clone());
            next.state = FlowState::FocusSetup;
        }

        (FlowState::FocusSetup, Action::SetTarget(target)) => next.target = Some(target.clone()),
        (FlowState::FocusSetup, Action::SetDuration(minutes)) => next.duration_min = Some(*minutes),
        (FlowState::FocusSetup, Action::StartFocus { at }) => {
            if !session.ready_to_focus() {
                return Err(reject());
            }
            next.start_time = Some(*at);
            next.state = FlowState::FocusRunning;
        }
        (FlowState::FocusSetup, Action::Back) => next.state = FlowState::LockIn,

        (FlowState::FocusRunning, Action::AddNote(note)) => next.notes = Some(note.clone()),
        (FlowState::FocusRunning, Action::EndFocus { at }) => {
            next.end_time = Some(*at);
            next.state = FlowState::Checkpoint;
        }

        (FlowState::Checkpoint, Action::AttachProof(proof)) => {
            next.proof = Some(proof.clone());
            next.state = FlowState::SelfRate;
        }
        (FlowState::Checkpoint, Action::SkipCheckpoint) => next.state = FlowState::SelfRate,
        (FlowState::Checkpoint, Action::Back) => next.state = FlowState::FocusRunning,

        (FlowState::SelfRate, Action::RateSession(rating)) => next.rating = Some(*rating),
        (FlowState::SelfRate, Action::Continue) => next.state = FlowState::Recap,

        (FlowState::Recap, Action::Continue | Action::SaveSummary) => {
            next.state = FlowState::RewardGate
        }
        (FlowState::Recap, Action::Discard) => return Ok(Session::new()),

        (FlowState::RewardGate, Action::Continue | Action::ClaimAward) => {
            next.state = FlowState::PostActions
        }

        _ => return Err(reject()),
    }

    Ok(next)
}
