use chrono::Local;

use crate::flow::{transition, Action, ActionKind, FlowState, InvalidTransition, Session};
use crate::history::{RecapSink, SessionSummary};

/// Where a dispatched action came from. Decides how loudly a rejection is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A key press or click.
    User,
    /// A countdown or other automatic advance.
    Auto,
}

/// Record of an accepted action, for collaborators that react to state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: FlowState,
    pub to: FlowState,
    pub action: ActionKind,
}

impl Transition {
    pub fn changed_state(&self) -> bool {
        self.from != self.to
    }
}

/// Holds the current [`Session`] and threads every action through [`transition`].
///
/// Dispatch takes `&mut self`, so one transition is in flight per store at a time.
pub struct SessionStore {
    session: Session,
    recaps: Option<Box<dyn RecapSink>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &self.session)
            .field("recaps", &self.recaps.is_some())
            .finish()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            session: Session::new(),
            recaps: None,
        }
    }

    /// Saved recaps go to `sink`.
    pub fn with_recaps(mut self, sink: Box<dyn RecapSink>) -> Self {
        self.recaps = Some(sink);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> FlowState {
        self.session.state()
    }

    /// Applies `action`. On rejection the session is left exactly as it was.
    pub fn dispatch(&mut self, action: Action, origin: Origin) -> Result<Transition, InvalidTransition> {
        let from = self.session.state();
        let next = match transition(&self.session, &action) {
            Ok(next) => next,
            Err(err) => {
                match origin {
                    Origin::User => tracing::warn!(%err, "rejected action"),
                    Origin::Auto => tracing::debug!(%err, "rejected automatic action"),
                }
                return Err(err);
            }
        };

        if action.kind() == ActionKind::SaveSummary {
            self.save_recap();
        }

        let change = Transition {
            from,
            to: next.state(),
            action: action.kind(),
        };
        if change.changed_state() {
            tracing::info!(from = %change.from, to = %change.to, action = %change.action, "session advanced");
        } else {
            tracing::debug!(state = %change.from, action = %change.action, "session updated");
        }

        self.session = next;
        Ok(change)
    }

    fn save_recap(&mut self) {
        let Some(sink) = self.recaps.as_mut() else {
            tracing::debug!("no recap sink configured, summary not kept");
            return;
        };
        let Some(summary) = SessionSummary::from_session(&self.session, Local::now()) else {
            tracing::warn!("session has no complete focus block to save");
            return;
        };
        match sink.record(&summary) {
            Ok(()) => tracing::info!(session_target = %summary.target, "saved session recap"),
            Err(err) => tracing::warn!(%err, "failed to save session recap"),
        }
    }
}
