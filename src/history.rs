use chrono::{DateTime, Local};
use itertools::Itertools;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

use crate::flow::{Rating, Session};
use crate::util::mean;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("history io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history export error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, HistoryError>;

/// What gets kept of a finished session when the user saves its recap.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub target: String,
    pub duration_min: u32,
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
    pub notes: Option<String>,
    pub proof: Option<String>,
    pub rating: Option<Rating>,
    pub multiplier_penalty: bool,
    pub saved_at: DateTime<Local>,
}

impl SessionSummary {
    /// Returns `None` unless the session has been through a full focus block.
    pub fn from_session(session: &Session, saved_at: DateTime<Local>) -> Option<Self> {
        Some(Self {
            target: session.target()?.to_string(),
            duration_min: session.duration_min()?,
            started_at: session.start_time()?,
            ended_at: session.end_time()?,
            notes: session.notes().map(str::to_string),
            proof: session.proof().map(str::to_string),
            rating: session.rating(),
            multiplier_penalty: session.multiplier_penalty(),
            saved_at,
        })
    }

    pub fn focused_minutes(&self) -> i64 {
        (self.ended_at - self.started_at).num_minutes().max(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStats {
    pub sessions: usize,
    pub mean_rating: Option<f64>,
    pub focused_minutes: i64,
    pub penalties: usize,
}

/// Anything that can keep a saved recap.
pub trait RecapSink {
    fn record(&mut self, summary: &SessionSummary) -> Result<()>;
}

const CSV_HEADER: [&str; 8] = [
    "saved_at",
    "target",
    "duration_min",
    "focused_min",
    "rating",
    "multiplier_penalty",
    "notes",
    "proof",
];

/// One export line; field order matches `CSV_HEADER`.
#[derive(Serialize)]
struct CsvRow<'a> {
    saved_at: String,
    target: &'a str,
    duration_min: u32,
    focused_min: i64,
    rating: Option<u8>,
    multiplier_penalty: bool,
    notes: Option<&'a str>,
    proof: Option<&'a str>,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS session_summaries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        target TEXT NOT NULL,
        duration_min INTEGER NOT NULL,
        started_at TEXT NOT NULL,
        ended_at TEXT NOT NULL,
        notes TEXT,
        proof TEXT,
        rating INTEGER,
        multiplier_penalty BOOLEAN NOT NULL,
        saved_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_session_summaries_saved_at ON session_summaries(saved_at);
"#;

/// Saved session recaps in SQLite.
#[derive(Debug)]
pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn record(&self, summary: &SessionSummary) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO session_summaries
            (target, duration_min, started_at, ended_at, notes, proof, rating, multiplier_penalty, saved_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                summary.target,
                summary.duration_min,
                summary.started_at.to_rfc3339(),
                summary.ended_at.to_rfc3339(),
                summary.notes,
                summary.proof,
                summary.rating.map(Rating::stars),
                summary.multiplier_penalty,
                summary.saved_at.to_rfc3339(),
            ],
        )?;
        tracing::debug!(session_target = %summary.target, "recorded session summary");
        Ok(())
    }

    /// Most recently saved summaries first.
    pub fn recent(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        self.query(i64::try_from(limit).unwrap_or(-1))
    }

    fn all(&self) -> Result<Vec<SessionSummary>> {
        // a negative LIMIT means no limit in SQLite
        self.query(-1)
    }

    fn query(&self, limit: i64) -> Result<Vec<SessionSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT target, duration_min, started_at, ended_at, notes, proof, rating, multiplier_penalty, saved_at
            FROM session_summaries
            ORDER BY saved_at DESC, id DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map([limit], summary_from_row)?;
        let summaries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }

    pub fn stats(&self) -> Result<HistoryStats> {
        let summaries = self.all()?;
        let ratings = summaries
            .iter()
            .filter_map(|s| s.rating)
            .map(|r| r.stars() as f64)
            .collect_vec();

        Ok(HistoryStats {
            sessions: summaries.len(),
            mean_rating: mean(&ratings),
            focused_minutes: summaries.iter().map(SessionSummary::focused_minutes).sum(),
            penalties: summaries.iter().filter(|s| s.multiplier_penalty).count(),
        })
    }

    /// Targets by how often they were saved, most frequent first, ties alphabetical.
    pub fn top_targets(&self, n: usize) -> Result<Vec<(String, usize)>> {
        let summaries = self.all()?;
        let top = summaries
            .into_iter()
            .map(|s| s.target)
            .counts()
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
            .take(n)
            .collect();
        Ok(top)
    }

    /// Writes every saved summary, oldest first, as CSV. The header row is
    /// written even when nothing has been saved.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut summaries = self.all()?;
        summaries.reverse();

        let mut out = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        out.write_record(CSV_HEADER)?;
        for s in &summaries {
            out.serialize(CsvRow {
                saved_at: s.saved_at.to_rfc3339(),
                target: &s.target,
                duration_min: s.duration_min,
                focused_min: s.focused_minutes(),
                rating: s.rating.map(Rating::stars),
                multiplier_penalty: s.multiplier_penalty,
                notes: s.notes.as_deref(),
                proof: s.proof.as_deref(),
            })?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM session_summaries", [])?;
        Ok(())
    }
}

impl RecapSink for HistoryDb {
    fn record(&mut self, summary: &SessionSummary) -> Result<()> {
        HistoryDb::record(self, summary)
    }
}

fn parse_time(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Local>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Local))
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(idx, "timestamp".to_string(), rusqlite::types::Type::Text)
        })
}

fn summary_from_row(row: &Row) -> rusqlite::Result<SessionSummary> {
    let rating: Option<u8> = row.get(6)?;
    Ok(SessionSummary {
        target: row.get(0)?,
        duration_min: row.get(1)?,
        started_at: parse_time(row, 2)?,
        ended_at: parse_time(row, 3)?,
        notes: row.get(4)?,
        proof: row.get(5)?,
        rating: rating.and_then(Rating::from_stars),
        multiplier_penalty: row.get(7)?,
        saved_at: parse_time(row, 8)?,
    })
}
