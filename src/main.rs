mod ui;

use chrono::Local;
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use lockin::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    control_action,
    history::HistoryDb,
    logging::{init_logging, LogConfig},
    rewards::reward_line,
    runtime::{CrosstermEventSource, FlowEvent, FlowEventSource, Runner, SessionTimers},
    visible_controls, Action, ActionKind, FlowState, Origin, Rating, SessionStore, Transition,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    time::Duration,
};

/// countdown-to-focus sessions for music producers
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Press Ready before the countdown ends, pick what you are making, focus for a set block, then rate, recap and claim your reward."
)]
pub struct Cli {
    /// seconds on the pre-start countdown
    #[clap(short = 'c', long)]
    countdown: Option<u64>,

    /// minutes offered for the focus block
    #[clap(short = 'd', long)]
    duration: Option<u32>,

    /// do not keep saved recaps in the history database
    #[clap(long)]
    no_history: bool,

    /// history database to use instead of the default location
    #[clap(long, value_name = "PATH")]
    history_db: Option<PathBuf>,

    /// write saved recaps as CSV to stdout and exit
    #[clap(long, conflicts_with = "clear_history")]
    export: bool,

    /// delete every saved recap and exit
    #[clap(long)]
    clear_history: bool,

    /// persist the given options as the new defaults
    #[clap(long)]
    save_config: bool,

    /// log file (defaults to the state directory)
    #[clap(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// more verbose logging (-v debug, -vv trace)
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Command-line values win over the stored config.
    fn apply_to(&self, mut config: Config) -> Config {
        if let Some(secs) = self.countdown {
            config.countdown_secs = secs;
        }
        if let Some(minutes) = self.duration {
            config.default_duration_min = minutes;
        }
        if self.no_history {
            config.history = false;
        }
        config
    }

    fn history_path(&self, config: &Config) -> Option<PathBuf> {
        if !config.history {
            return None;
        }
        self.history_db.clone().or_else(AppDirs::db_path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Flow,
    History,
}

/// Free text being typed for a control that carries a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextInput {
    pub kind: ActionKind,
    pub buffer: String,
}

impl TextInput {
    fn prompt(&self) -> &'static str {
        match self.kind {
            ActionKind::SetTarget => "Session target",
            ActionKind::SetDuration => "Minutes",
            ActionKind::AddNote => "Note",
            _ => "Proof (link, file or bounce name)",
        }
    }

    fn into_action(self) -> Result<Action, String> {
        let text = self.buffer.trim().to_string();
        match self.kind {
            ActionKind::SetTarget => Ok(Action::SetTarget(text)),
            ActionKind::SetDuration => text
                .parse::<u32>()
                .map(Action::SetDuration)
                .map_err(|_| format!("'{text}' is not a whole number of minutes")),
            ActionKind::AddNote => Ok(Action::AddNote(text)),
            _ => Ok(Action::AttachProof(text)),
        }
    }
}

#[derive(Debug)]
pub struct App {
    pub store: SessionStore,
    pub config: Config,
    pub screen: Screen,
    pub selected: usize,
    pub input: Option<TextInput>,
    pub timers: SessionTimers,
    pub reward_line: &'static str,
    pub status: Option<String>,
    pub history_path: Option<PathBuf>,
}

impl App {
    pub fn new(config: Config, history_path: Option<PathBuf>) -> Self {
        let mut store = SessionStore::new();
        if let Some(path) = &history_path {
            match HistoryDb::open(path) {
                Ok(db) => store = store.with_recaps(Box::new(db)),
                Err(err) => tracing::warn!(%err, "history unavailable, recaps will not be kept"),
            }
        }

        Self {
            store,
            timers: SessionTimers::new(config.countdown_secs),
            config,
            screen: Screen::Flow,
            selected: 0,
            input: None,
            reward_line: "",
            status: None,
            history_path,
        }
    }

    pub fn state(&self) -> FlowState {
        self.store.state()
    }

    pub fn controls(&self) -> &'static [&'static str] {
        visible_controls(self.state())
    }

    pub fn on_tick(&mut self, elapsed: Duration) {
        for action in self.timers.on_tick(elapsed, Local::now()) {
            self.dispatch(action, Origin::Auto);
        }
    }

    /// Returns false when the app should exit.
    pub fn on_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return false;
        }

        if self.input.is_some() {
            self.on_input_key(key);
            return true;
        }

        match self.screen {
            Screen::History => match key.code {
                KeyCode::Esc | KeyCode::Char('h') | KeyCode::Char('b') | KeyCode::Backspace => {
                    self.screen = Screen::Flow;
                }
                KeyCode::Char('q') => return false,
                _ => {}
            },
            Screen::Flow => match key.code {
                KeyCode::Esc | KeyCode::Char('q') => return false,
                KeyCode::Char('h') => self.screen = Screen::History,
                KeyCode::Up | KeyCode::Char('k') => {
                    self.selected = self.selected.saturating_sub(1);
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    self.selected = (self.selected + 1).min(self.controls().len().saturating_sub(1));
                }
                KeyCode::Enter | KeyCode::Char(' ') => self.activate(),
                KeyCode::Char('r') => self.dispatch(Action::Reset, Origin::User),
                KeyCode::Char(c @ '1'..='9') => {
                    let idx = c as usize - '1' as usize;
                    if idx < self.controls().len() {
                        self.selected = idx;
                        self.activate();
                    }
                }
                _ => {}
            },
        }
        true
    }

    fn on_input_key(&mut self, key: KeyEvent) {
        let Some(input) = self.input.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => self.input = None,
            KeyCode::Backspace => {
                input.buffer.pop();
            }
            KeyCode::Char(c) => input.buffer.push(c),
            KeyCode::Enter => {
                if let Some(input) = self.input.take() {
                    match input.into_action() {
                        Ok(action) => self.dispatch(action, Origin::User),
                        Err(msg) => self.status = Some(msg),
                    }
                }
            }
            _ => {}
        }
    }

    /// Runs the highlighted control.
    pub fn activate(&mut self) {
        let state = self.state();
        let Some(label) = self.controls().get(self.selected).copied() else {
            return;
        };
        let Some(kind) = control_action(state, label) else {
            return;
        };

        let action = match kind {
            ActionKind::SetTarget | ActionKind::SetDuration | ActionKind::AddNote | ActionKind::AttachProof => {
                self.input = Some(TextInput {
                    kind,
                    buffer: self.prefill(kind),
                });
                return;
            }
            ActionKind::PickType => Action::PickType(label.to_string()),
            ActionKind::RateSession => match label.parse().ok().and_then(Rating::from_stars) {
                Some(rating) => Action::RateSession(rating),
                None => return,
            },
            ActionKind::StartFocus => Action::StartFocus { at: Local::now() },
            ActionKind::EndFocus => Action::EndFocus { at: Local::now() },
            ActionKind::Ready => Action::Ready,
            ActionKind::TimerZero => Action::TimerZero,
            ActionKind::SkipCheckpoint => Action::SkipCheckpoint,
            ActionKind::Continue => Action::Continue,
            ActionKind::SaveSummary => Action::SaveSummary,
            ActionKind::Discard => Action::Discard,
            ActionKind::ClaimAward => Action::ClaimAward,
            ActionKind::Back => Action::Back,
            ActionKind::Reset => Action::Reset,
        };
        self.dispatch(action, Origin::User);
    }

    fn prefill(&self, kind: ActionKind) -> String {
        let session = self.store.session();
        match kind {
            ActionKind::SetTarget => session.target().unwrap_or_default().to_string(),
            ActionKind::SetDuration => session
                .duration_min()
                .map(|d| d.to_string())
                .unwrap_or_default(),
            ActionKind::AddNote => session.notes().unwrap_or_default().to_string(),
            _ => String::new(),
        }
    }

    pub fn dispatch(&mut self, action: Action, origin: Origin) {
        match self.store.dispatch(action, origin) {
            Ok(change) => {
                self.status = None;
                self.after_transition(change);
            }
            Err(err) if origin == Origin::User => self.status = Some(err.to_string()),
            Err(_) => {}
        }
    }

    fn after_transition(&mut self, change: Transition) {
        if change.changed_state() || change.action == ActionKind::Reset {
            self.selected = 0;
        }

        self.timers.follow(&change, self.store.session());

        match (change.from, change.to) {
            (FlowState::LockIn, FlowState::FocusSetup) => {
                if self.store.session().duration_min().is_none() {
                    self.dispatch(Action::SetDuration(self.config.default_duration_min), Origin::Auto);
                }
            }
            (_, FlowState::RewardGate) => {
                self.reward_line = reward_line(&mut rand::thread_rng(), self.store.session().multiplier());
            }
            _ => {}
        }
    }
}

fn open_history(path: Option<PathBuf>) -> Result<HistoryDb, Box<dyn Error>> {
    let Some(path) = path else {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::ArgumentConflict, "history is disabled").exit();
    };
    Ok(HistoryDb::open(path)?)
}

fn export_history(path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    open_history(path)?.export_csv(io::stdout().lock())?;
    Ok(())
}

fn clear_history(path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let db = open_history(path)?;
    let removed = db.stats()?.sessions;
    db.clear()?;
    tracing::info!(removed, "cleared history");
    println!("removed {removed} saved sessions");
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_verbosity(cli.verbose)
        .with_log_file(cli.log_file.clone().or_else(AppDirs::log_path));
    init_logging(&log_config)?;

    let config_store = FileConfigStore::new();
    let config = cli.apply_to(config_store.load());
    if cli.save_config {
        config_store.save(&config)?;
        tracing::info!(path = %config_store.path().display(), "saved config");
    }

    let history_path = cli.history_path(&config);
    if cli.export {
        return export_history(history_path);
    }
    if cli.clear_history {
        return clear_history(history_path);
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let interval = Duration::from_millis(config.tick_rate_ms.max(10));
    let mut app = App::new(config, history_path);
    let mut runner = Runner::new(CrosstermEventSource::new(), interval);
    let result = run(&mut terminal, &mut app, &mut runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run<B: Backend, E: FlowEventSource>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &mut Runner<E>,
) -> Result<(), Box<dyn Error>> {
    loop {
        terminal.draw(|f| ui::draw(app, f))?;

        match runner.step() {
            FlowEvent::Tick(elapsed) => app.on_tick(elapsed),
            FlowEvent::Resize => {}
            FlowEvent::Key(key) => {
                if !app.on_key(key) {
                    break;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockin::runtime::ChannelEventSource;
    use ratatui::backend::TestBackend;
    use std::sync::mpsc;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn test_app() -> App {
        let config = Config {
            countdown_secs: 1,
            ..Config::default()
        };
        App::new(config, None)
    }

    fn press(app: &mut App, codes: &[KeyCode]) {
        for code in codes {
            assert!(app.on_key(key(*code)));
        }
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.on_key(key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["lockin"]);
        assert_eq!(cli.countdown, None);
        assert_eq!(cli.duration, None);
        assert!(!cli.no_history);
        assert!(!cli.export);
        assert!(!cli.clear_history);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from(["lockin", "-c", "5", "--duration", "45", "--no-history", "-vv"]);
        let config = cli.apply_to(Config::default());
        assert_eq!(config.countdown_secs, 5);
        assert_eq!(config.default_duration_min, 45);
        assert!(!config.history);
        assert_eq!(cli.history_path(&config), None);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_export_and_clear_conflict() {
        assert!(Cli::try_parse_from(["lockin", "--export", "--clear-history"]).is_err());
    }

    #[test]
    fn test_cli_history_db_path() {
        let cli = Cli::parse_from(["lockin", "--history-db", "/tmp/h.db"]);
        let config = cli.apply_to(Config::default());
        assert_eq!(cli.history_path(&config), Some(PathBuf::from("/tmp/h.db")));
    }

    #[test]
    fn test_countdown_auto_locks_in_with_penalty() {
        let mut app = test_app();
        for _ in 0..12 {
            app.on_tick(Duration::from_millis(100));
        }
        assert_eq!(app.state(), FlowState::LockIn);
        assert!(app.store.session().multiplier_penalty());
        assert!(app.timers.pre_start_remaining().is_none());
    }

    #[test]
    fn test_ready_then_start_now() {
        let mut app = test_app();
        press(&mut app, &[KeyCode::Enter]);
        assert!(app.store.session().ready_pressed());
        press(&mut app, &[KeyCode::Down, KeyCode::Enter]);
        assert_eq!(app.state(), FlowState::LockIn);
        assert!(!app.store.session().multiplier_penalty());
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn test_pick_type_prefills_default_duration() {
        let mut app = test_app();
        press(&mut app, &[KeyCode::Char('2'), KeyCode::Char('3')]);
        assert_eq!(app.state(), FlowState::FocusSetup);
        assert_eq!(app.store.session().target(), Some("Mix"));
        assert_eq!(app.store.session().duration_min(), Some(25));
    }

    #[test]
    fn test_text_input_sets_target_and_duration() {
        let mut app = test_app();
        press(&mut app, &[KeyCode::Char('2'), KeyCode::Char('1')]);

        press(&mut app, &[KeyCode::Char('1')]);
        assert_eq!(app.input.as_ref().map(|i| i.buffer.as_str()), Some("Beat"));
        for _ in 0.."Beat".len() {
            press(&mut app, &[KeyCode::Backspace]);
        }
        type_text(&mut app, "808 pattern");
        press(&mut app, &[KeyCode::Enter]);
        assert_eq!(app.store.session().target(), Some("808 pattern"));

        press(&mut app, &[KeyCode::Char('2'), KeyCode::Backspace, KeyCode::Backspace]);
        type_text(&mut app, "abc");
        press(&mut app, &[KeyCode::Enter]);
        assert!(app.status.as_deref().unwrap().contains("whole number"));
        assert_eq!(app.store.session().duration_min(), Some(25));
    }

    #[test]
    fn test_escape_cancels_input_without_quitting() {
        let mut app = test_app();
        press(&mut app, &[KeyCode::Char('2'), KeyCode::Char('1'), KeyCode::Char('1')]);
        assert!(app.input.is_some());
        assert!(app.on_key(key(KeyCode::Esc)));
        assert!(app.input.is_none());
        assert!(!app.on_key(key(KeyCode::Esc)));
    }

    #[test]
    fn test_full_cycle_through_keys() {
        let mut app = test_app();
        // Ready, Start Now, Practice, Start Focus
        press(&mut app, &[KeyCode::Char('1'), KeyCode::Char('2'), KeyCode::Char('4'), KeyCode::Char('3')]);
        assert_eq!(app.state(), FlowState::FocusRunning);
        assert!(app.timers.focus_remaining().is_some());

        // End Focus, Skip, rate 3, Continue
        press(&mut app, &[KeyCode::Char('2'), KeyCode::Char('2'), KeyCode::Char('3'), KeyCode::Char('4')]);
        assert_eq!(app.state(), FlowState::Recap);
        assert_eq!(app.store.session().rating(), Some(Rating::Three));

        // Continue, Claim Award
        press(&mut app, &[KeyCode::Char('3'), KeyCode::Char('1')]);
        assert_eq!(app.state(), FlowState::PostActions);

        // New Session
        press(&mut app, &[KeyCode::Char('1')]);
        assert_eq!(app.state(), FlowState::PreStart);
        assert_eq!(app.timers.pre_start_remaining(), Some(1.0));
    }

    #[test]
    fn test_focus_timer_ends_block() {
        let mut app = test_app();
        press(&mut app, &[KeyCode::Char('2'), KeyCode::Char('1')]);
        app.input = Some(TextInput {
            kind: ActionKind::SetDuration,
            buffer: "1".into(),
        });
        press(&mut app, &[KeyCode::Enter, KeyCode::Char('3')]);
        assert_eq!(app.state(), FlowState::FocusRunning);

        app.on_tick(Duration::from_secs(61));
        assert_eq!(app.state(), FlowState::Checkpoint);
        assert!(app.store.session().end_time().is_some());
    }

    #[test]
    fn test_back_from_checkpoint_resumes_timer() {
        let mut app = test_app();
        let start = Local::now();
        for action in [
            Action::TimerZero,
            Action::PickType("Beat".into()),
            Action::StartFocus { at: start },
            Action::EndFocus {
                at: start + chrono::Duration::minutes(10),
            },
        ] {
            app.dispatch(action, Origin::User);
        }
        assert_eq!(app.state(), FlowState::Checkpoint);
        assert!(app.timers.focus_remaining().is_none());

        app.dispatch(Action::Back, Origin::User);
        assert_eq!(app.state(), FlowState::FocusRunning);
        assert_eq!(app.timers.focus_remaining(), Some(15.0 * 60.0));

        app.on_tick(Duration::from_secs(3600));
        assert_eq!(app.state(), FlowState::Checkpoint);
        assert!(app.store.session().end_time() > Some(start + chrono::Duration::minutes(10)));
    }

    #[test]
    fn test_rejected_user_action_sets_status() {
        let mut app = test_app();
        app.dispatch(Action::Continue, Origin::User);
        assert_eq!(
            app.status.as_deref(),
            Some("invalid transition: CONTINUE is not allowed from PRE_START")
        );
        app.dispatch(Action::Back, Origin::Auto);
        assert_eq!(app.state(), FlowState::PreStart);
    }

    #[test]
    fn test_history_screen_toggle() {
        let mut app = test_app();
        press(&mut app, &[KeyCode::Char('h')]);
        assert_eq!(app.screen, Screen::History);
        press(&mut app, &[KeyCode::Char('h')]);
        assert_eq!(app.screen, Screen::Flow);
    }

    #[test]
    fn test_ctrl_c_quits() {
        let mut app = test_app();
        assert!(!app.on_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
    }

    #[test]
    fn test_run_loop_until_quit() {
        let (tx, rx) = mpsc::channel();
        tx.send(FlowEvent::Key(key(KeyCode::Char('1')))).unwrap();
        tx.send(FlowEvent::Resize).unwrap();
        tx.send(FlowEvent::Key(key(KeyCode::Char('q')))).unwrap();

        let mut runner = Runner::new(ChannelEventSource::new(rx), Duration::from_millis(5));
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let mut app = test_app();
        run(&mut terminal, &mut app, &mut runner).unwrap();
        assert!(app.store.session().ready_pressed());
    }
}
