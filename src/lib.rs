// Library surface for the terminal shell, headless drivers and integration tests.
// The binary keeps its screens and key handling to itself.
pub mod app_dirs;
pub mod config;
pub mod controls;
pub mod countdown;
pub mod flow;
pub mod history;
pub mod logging;
pub mod rewards;
pub mod runtime;
pub mod store;
pub mod util;

pub use controls::{control_action, visible_controls};
pub use flow::{transition, Action, ActionKind, FlowState, InvalidTransition, Rating, Session};
pub use store::{Origin, SessionStore, Transition};
