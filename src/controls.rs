//! Static table of the controls a shell renders for each [`FlowState`].
//!
//! The table is kept by hand. Every label maps to the [`ActionKind`] it
//! dispatches, and the tests walk both tables against [`crate::flow::transition`]
//! so a label can never offer an action the machine would reject.

use crate::flow::{ActionKind, FlowState};

/// Session types offered when locking in.
pub const SESSION_TYPES: [&str; 4] = ["Beat", "Bars", "Mix", "Practice"];

pub fn visible_controls(state: FlowState) -> &'static [&'static str] {
    match state {
        FlowState::PreStart => &["Ready", "Start Now"],
        FlowState::LockIn => &SESSION_TYPES,
        FlowState::FocusSetup => &["Set Target", "Set Duration", "Start Focus", "Back"],
        FlowState::FocusRunning => &["Add Note", "End Focus"],
        FlowState::Checkpoint => &["Attach Proof", "Skip", "Back"],
        FlowState::SelfRate => &["1", "2", "3", "Continue"],
        FlowState::Recap => &["Save Summary", "Discard", "Continue"],
        FlowState::RewardGate => &["Claim Award", "Continue"],
        FlowState::PostActions => &["New Session"],
        FlowState::VaultClosed => &["Back to Start"],
        FlowState::Dashboard => &["New Session"],
        FlowState::Questionnaire => &["Skip Questionnaire"],
        FlowState::Preparation => &["Begin"],
        FlowState::ScrollDemo => &["Exit Demo"],
    }
}

/// The action a visible control dispatches, or `None` if `label` is not
/// shown in `state`.
pub fn control_action(state: FlowState, label: &str) -> Option<ActionKind> {
    if !visible_controls(state).contains(&label) {
        return None;
    }
    let kind = match (state, label) {
        (FlowState::PreStart, "Ready") => ActionKind::Ready,
        (FlowState::PreStart, "Start Now") => ActionKind::TimerZero,
        (FlowState::LockIn, _) => ActionKind::PickType,
        (FlowState::FocusSetup, "Set Target") => ActionKind::SetTarget,
        (FlowState::FocusSetup, "Set Duration") => ActionKind::SetDuration,
        (FlowState::FocusSetup, "Start Focus") => ActionKind::StartFocus,
        (FlowState::FocusRunning, "Add Note") => ActionKind::AddNote,
        (FlowState::FocusRunning, "End Focus") => ActionKind::EndFocus,
        (FlowState::Checkpoint, "Attach Proof") => ActionKind::AttachProof,
        (FlowState::Checkpoint, "Skip") => ActionKind::SkipCheckpoint,
        (FlowState::SelfRate, "1" | "2" | "3") => ActionKind::RateSession,
        (FlowState::Recap, "Save Summary") => ActionKind::SaveSummary,
        (FlowState::Recap, "Discard") => ActionKind::Discard,
        (FlowState::RewardGate, "Claim Award") => ActionKind::ClaimAward,
        (_, "Back") if state.is_core() => ActionKind::Back,
        (_, "Continue") => ActionKind::Continue,
        // New Session and the shell exits all start over
        _ => ActionKind::Reset,
    };
    Some(kind)
}
