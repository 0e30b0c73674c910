use chrono::{Duration, Local, TimeZone};

use lockin::history::HistoryDb;
use lockin::{Action, FlowState, Origin, Rating, SessionStore};

fn finish_session(store: &mut SessionStore, target: &str, minutes: i64, on_time: bool) {
    let start = Local.with_ymd_and_hms(2024, 6, 3, 20, 0, 0).unwrap();
    if on_time {
        store.dispatch(Action::Ready, Origin::User).unwrap();
    }
    let steps = [
        Action::TimerZero,
        Action::PickType(target.to_string()),
        Action::SetDuration(minutes as u32),
        Action::StartFocus { at: start },
        Action::AddNote("kick is too loud".to_string()),
        Action::EndFocus {
            at: start + Duration::minutes(minutes),
        },
        Action::SkipCheckpoint,
        Action::RateSession(Rating::Two),
        Action::Continue,
    ];
    for action in steps {
        store.dispatch(action, Origin::User).unwrap();
    }
    assert_eq!(store.state(), FlowState::Recap);
}

#[test]
fn saved_recaps_land_in_file_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.db");

    let mut store = SessionStore::new().with_recaps(Box::new(HistoryDb::open(&path).unwrap()));
    finish_session(&mut store, "Beat", 25, true);
    store.dispatch(Action::SaveSummary, Origin::User).unwrap();
    assert_eq!(store.state(), FlowState::RewardGate);

    store.dispatch(Action::Reset, Origin::User).unwrap();
    finish_session(&mut store, "Mix", 40, false);
    store.dispatch(Action::SaveSummary, Origin::User).unwrap();

    let db = HistoryDb::open(&path).unwrap();
    let recent = db.recent(10).unwrap();
    assert_eq!(recent.len(), 2);
    assert!(recent.iter().any(|s| s.target == "Beat" && !s.multiplier_penalty));
    assert!(recent.iter().any(|s| s.target == "Mix" && s.multiplier_penalty));
    assert!(recent.iter().all(|s| s.notes.as_deref() == Some("kick is too loud")));

    let stats = db.stats().unwrap();
    assert_eq!(stats.sessions, 2);
    assert_eq!(stats.focused_minutes, 65);
    assert_eq!(stats.penalties, 1);
    assert_eq!(stats.mean_rating, Some(2.0));
}

#[test]
fn discarded_recap_is_not_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.db");

    let mut store = SessionStore::new().with_recaps(Box::new(HistoryDb::open(&path).unwrap()));
    finish_session(&mut store, "Bars", 15, true);
    store.dispatch(Action::Discard, Origin::User).unwrap();
    assert_eq!(store.state(), FlowState::PreStart);

    let db = HistoryDb::open(&path).unwrap();
    assert!(db.recent(10).unwrap().is_empty());
}

#[test]
fn exported_csv_lists_saved_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.db");

    let mut store = SessionStore::new().with_recaps(Box::new(HistoryDb::open(&path).unwrap()));
    finish_session(&mut store, "Practice", 20, true);
    store.dispatch(Action::SaveSummary, Origin::User).unwrap();

    let mut out = Vec::new();
    HistoryDb::open(&path).unwrap().export_csv(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.contains(",Practice,20,20,2,false,kick is too loud,"));
}
