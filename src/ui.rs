use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Widget, Wrap},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use lockin::{
    history::{HistoryDb, HistoryStats, SessionSummary},
    rewards::award_points,
    util::{format_clock, format_minutes},
    FlowState, Session,
};

use crate::{App, Screen};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;
const HISTORY_ROWS: usize = 50;
const TOP_TARGETS: usize = 3;

pub fn draw(app: &App, f: &mut Frame) {
    match app.screen {
        Screen::Flow => f.render_widget(app, f.area()),
        Screen::History => render_history(app, f),
    }
}

/// Cuts `text` to at most `max` display columns, marking the cut with an ellipsis.
fn fit_width(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push('…');
    out
}

fn body_lines(app: &App, session: &Session) -> Vec<Line<'static>> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let dim = Style::default().add_modifier(Modifier::DIM);
    let target = session.target().unwrap_or("-").to_string();

    match session.state() {
        FlowState::PreStart => {
            let secs = app.timers.pre_start_remaining().unwrap_or(0.0);
            let ready = if session.ready_pressed() {
                Span::styled("READY - x2 multiplier locked", Style::default().fg(Color::Green).patch(bold))
            } else {
                Span::styled("Press Ready before zero to keep the x2 multiplier", dim)
            };
            vec![
                Line::from(Span::styled(format_clock(secs), bold.fg(Color::Yellow))),
                Line::from(""),
                Line::from(ready),
            ]
        }
        FlowState::LockIn => {
            let multiplier = if session.multiplier_penalty() {
                Span::styled("Missed Ready: x1 this session", Style::default().fg(Color::Red))
            } else {
                Span::styled("x2 multiplier active", Style::default().fg(Color::Green))
            };
            vec![Line::from(Span::styled("What are you making?", bold)), Line::from(multiplier)]
        }
        FlowState::FocusSetup => vec![
            Line::from(vec![Span::styled("Target   ", dim), Span::styled(target, bold)]),
            Line::from(vec![
                Span::styled("Duration ", dim),
                Span::styled(
                    session.duration_min().map_or("-".to_string(), |d| format!("{d} min")),
                    bold,
                ),
            ]),
        ],
        FlowState::FocusRunning => {
            let clock = app
                .timers
                .focus_remaining()
                .map_or("--:--".to_string(), format_clock);
            let mut lines = vec![
                Line::from(Span::styled(clock, bold.fg(Color::Cyan))),
                Line::from(Span::styled(target, bold)),
            ];
            if let Some(note) = session.notes() {
                lines.push(Line::from(Span::styled(format!("note: {note}"), dim)));
            }
            lines
        }
        FlowState::Checkpoint => vec![
            Line::from(Span::styled("Checkpoint", bold)),
            Line::from(Span::styled("Attach proof of the work, or skip it", dim)),
        ],
        FlowState::SelfRate => {
            let stars = session.rating().map_or(0, |r| r.stars()) as usize;
            vec![
                Line::from(Span::styled("How did it go?", bold)),
                Line::from(Span::styled(
                    format!("{}{}", "★".repeat(stars), "☆".repeat(3 - stars)),
                    Style::default().fg(Color::Yellow),
                )),
            ]
        }
        FlowState::Recap => {
            let minutes = session.focused_minutes().unwrap_or(0);
            let mut lines = vec![
                Line::from(Span::styled(format!("Recap: {target}"), bold)),
                Line::from(format!(
                    "focused {} of {} planned",
                    format_minutes(minutes),
                    format_minutes(i64::from(session.duration_min().unwrap_or(0)))
                )),
                Line::from(format!(
                    "rating {}   multiplier x{}",
                    session.rating().map_or("-".to_string(), |r| r.stars().to_string()),
                    session.multiplier()
                )),
            ];
            if let Some(note) = session.notes() {
                lines.push(Line::from(Span::styled(format!("note: {note}"), dim)));
            }
            if let Some(proof) = session.proof() {
                lines.push(Line::from(Span::styled(format!("proof: {proof}"), dim)));
            }
            lines
        }
        FlowState::RewardGate | FlowState::PostActions => {
            let points = award_points(session.focused_minutes().unwrap_or(0), session.multiplier());
            let headline = if session.state() == FlowState::RewardGate {
                app.reward_line.to_string()
            } else {
                "Session complete".to_string()
            };
            vec![
                Line::from(Span::styled(headline, bold)),
                Line::from(Span::styled(format!("{points} points"), bold.fg(Color::Magenta))),
            ]
        }
        other => vec![Line::from(Span::styled(other.to_string(), dim))],
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let session = self.store.session();
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let italic_style = Style::default().add_modifier(Modifier::ITALIC);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1), // state title
                Constraint::Min(4),    // body
                Constraint::Length(self.controls().len() as u16 + 2),
                Constraint::Length(3), // text input
                Constraint::Length(1), // status / legend
            ])
            .split(area);

        Paragraph::new(Span::styled(
            session.state().to_string().replace('_', " "),
            bold_style.fg(Color::Cyan),
        ))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

        Paragraph::new(body_lines(self, session))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(chunks[1], buf);

        let max_label = chunks[2].width.saturating_sub(8) as usize;
        let controls: Vec<Line> = self
            .controls()
            .iter()
            .enumerate()
            .map(|(idx, label)| {
                let text = format!("{}. {}", idx + 1, fit_width(label, max_label));
                if idx == self.selected {
                    Line::from(Span::styled(
                        format!("> {text}"),
                        bold_style.add_modifier(Modifier::REVERSED),
                    ))
                } else {
                    Line::from(format!("  {text}"))
                }
            })
            .collect();
        Paragraph::new(controls)
            .block(Block::default().borders(Borders::ALL).title("Actions"))
            .render(chunks[2], buf);

        if let Some(input) = &self.input {
            Paragraph::new(format!("{}▏", input.buffer))
                .block(Block::default().borders(Borders::ALL).title(input.prompt()))
                .render(chunks[3], buf);
        }

        let footer = match &self.status {
            Some(msg) => Span::styled(msg.clone(), Style::default().fg(Color::Red)),
            None if self.input.is_some() => Span::styled("(enter) confirm / (esc) cancel", italic_style),
            None => Span::styled(
                "(↑/↓) select / (enter) do / (1-9) quick pick / (r)eset / (h)istory / (esc)ape",
                italic_style,
            ),
        };
        Paragraph::new(footer)
            .alignment(Alignment::Center)
            .render(chunks[4], buf);
    }
}

struct HistoryView {
    stats: HistoryStats,
    top: Vec<(String, usize)>,
    recent: Vec<SessionSummary>,
}

fn load_history(app: &App) -> Option<HistoryView> {
    let db = HistoryDb::open(app.history_path.as_ref()?).ok()?;
    Some(HistoryView {
        stats: db.stats().ok()?,
        top: db.top_targets(TOP_TARGETS).ok()?,
        recent: db.recent(HISTORY_ROWS).ok()?,
    })
}

fn top_targets_line(top: &[(String, usize)]) -> String {
    if top.is_empty() {
        return "no saved sessions yet".to_string();
    }
    let parts: Vec<String> = top.iter().map(|(target, n)| format!("{target} ({n})")).collect();
    format!("most worked on: {}", parts.join(", "))
}

fn render_history(app: &App, f: &mut Frame) {
    let area = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(4), // stats + top targets
            Constraint::Min(0),    // table
            Constraint::Length(1), // legend
        ])
        .split(area);

    let legend = Paragraph::new(Span::styled(
        "(h/b) back / (q)uit",
        Style::default().add_modifier(Modifier::ITALIC),
    ));
    f.render_widget(legend, chunks[2]);

    let Some(HistoryView { stats, top, recent }) = load_history(app) else {
        let empty = Paragraph::new("History is disabled or unavailable.")
            .block(Block::default().borders(Borders::ALL).title("History"))
            .alignment(Alignment::Center);
        f.render_widget(empty, chunks[0]);
        return;
    };

    let summary = format!(
        "{} sessions   {} focused   avg rating {}   {} missed Ready",
        stats.sessions,
        format_minutes(stats.focused_minutes),
        stats
            .mean_rating
            .map_or("-".to_string(), |r| format!("{r:.1}")),
        stats.penalties
    );
    let title = Paragraph::new(vec![
        Line::from(Span::styled(
            summary,
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(top_targets_line(&top)),
    ])
    .block(Block::default().borders(Borders::ALL).title("History"))
    .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    let header = Row::new(vec![
        Cell::from("Saved"),
        Cell::from("Target"),
        Cell::from("Focused"),
        Cell::from("Rating"),
        Cell::from("x"),
    ])
    .style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    );

    let target_width = chunks[1].width.saturating_sub(40).max(8) as usize;
    let rows: Vec<Row> = recent
        .iter()
        .map(|s| {
            let multiplier = if s.multiplier_penalty { "1" } else { "2" };
            Row::new(vec![
                Cell::from(s.saved_at.format("%Y-%m-%d %H:%M").to_string()),
                Cell::from(fit_width(&s.target, target_width)),
                Cell::from(format_minutes(s.focused_minutes())),
                Cell::from(s.rating.map_or("-".to_string(), |r| r.stars().to_string())),
                Cell::from(multiplier),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(17),
            Constraint::Min(8),
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Length(2),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title("Recent"));
    f.render_widget(table, chunks[1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Local};
    use lockin::{config::Config, Action, Origin};
    use ratatui::{backend::TestBackend, Terminal};

    fn render(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw(app, f)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn pre_start_shows_countdown_and_controls() {
        let app = App::new(Config::default(), None);
        let content = render(&app);
        assert!(content.contains("PRE START"));
        assert!(content.contains("00:10"));
        assert!(content.contains("Ready"));
        assert!(content.contains("Start Now"));
    }

    #[test]
    fn lock_in_lists_session_types() {
        let mut app = App::new(Config::default(), None);
        app.dispatch(Action::TimerZero, Origin::Auto);
        let content = render(&app);
        for label in ["Beat", "Bars", "Mix", "Practice"] {
            assert!(content.contains(label), "missing {label}");
        }
        assert!(content.contains("Missed Ready"));
    }

    #[test]
    fn status_message_replaces_legend() {
        let mut app = App::new(Config::default(), None);
        app.dispatch(Action::Back, Origin::User);
        assert!(render(&app).contains("BACK is not allowed from PRE_START"));
    }

    #[test]
    fn recap_and_history_screens_render() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::new(Config::default(), Some(dir.path().join("history.db")));
        let start = Local::now();
        for action in [
            Action::Ready,
            Action::TimerZero,
            Action::PickType("Beat".into()),
            Action::StartFocus { at: start },
            Action::EndFocus { at: start + Duration::minutes(25) },
            Action::SkipCheckpoint,
            Action::Continue,
        ] {
            app.dispatch(action, Origin::User);
        }
        assert_eq!(app.state(), FlowState::Recap);
        let content = render(&app);
        assert!(content.contains("Recap: Beat"));
        assert!(content.contains("focused 25m of 25m planned"));

        app.dispatch(Action::SaveSummary, Origin::User);
        app.screen = Screen::History;
        let content = render(&app);
        assert!(content.contains("1 sessions"));
        assert!(content.contains("most worked on: Beat (1)"));
    }

    #[test]
    fn history_screen_without_database() {
        let mut app = App::new(Config::default(), None);
        app.screen = Screen::History;
        assert!(render(&app).contains("History is disabled"));
    }

    #[test]
    fn top_targets_line_lists_counts() {
        assert_eq!(top_targets_line(&[]), "no saved sessions yet");
        let top = vec![("Mix".to_string(), 3), ("Beat".to_string(), 1)];
        assert_eq!(top_targets_line(&top), "most worked on: Mix (3), Beat (1)");
    }

    #[test]
    fn fit_width_truncates_with_ellipsis() {
        assert_eq!(fit_width("Beat", 10), "Beat");
        assert_eq!(fit_width("Finish the hook", 6), "Finis…");
    }
}
