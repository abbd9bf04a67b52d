//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::{debug, info};

use aquasync_types::IntakeEvent;

use crate::error::{Error, Result};

/// Current schema version.
const SCHEMA_VERSION: i32 = 1;

/// Day key format used for per-day intake rows.
const DAY_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// The stored consumption reference point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    /// Last recorded bottle level in millilitres.
    pub ml: f64,
    /// When the baseline was recorded.
    pub recorded_at: OffsetDateTime,
}

/// One logged intake event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntakeRecord {
    /// When the intake was logged.
    pub logged_at: OffsetDateTime,
    /// Millilitres consumed.
    pub ml: f64,
    /// The same amount in fluid ounces.
    pub fl_oz: f64,
}

/// SQLite-based store for hydration state.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize(&conn)?;
        Ok(Self { conn })
    }

    // === Baseline ===

    /// The stored baseline, if one has been recorded.
    pub fn baseline(&self) -> Result<Option<Baseline>> {
        let row = self
            .conn
            .query_row(
                "SELECT ml, recorded_at FROM baseline WHERE id = 1",
                [],
                |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        match row {
            Some((ml, recorded_at)) => {
                let recorded_at = OffsetDateTime::from_unix_timestamp(recorded_at)
                    .map_err(|e| Error::InvalidTimestamp(e.to_string()))?;
                Ok(Some(Baseline { ml, recorded_at }))
            }
            None => Ok(None),
        }
    }

    /// Record a new baseline, replacing any previous one.
    pub fn set_baseline(&self, ml: f64) -> Result<()> {
        debug!(ml, "recording new baseline");
        self.conn.execute(
            "INSERT OR REPLACE INTO baseline (id, ml, recorded_at) VALUES (1, ?1, ?2)",
            params![ml, OffsetDateTime::now_utc().unix_timestamp()],
        )?;
        Ok(())
    }

    /// Drop the baseline; the next reading establishes a fresh one.
    pub fn clear_baseline(&self) -> Result<()> {
        self.conn.execute("DELETE FROM baseline WHERE id = 1", [])?;
        Ok(())
    }

    // === Daily intake ===

    /// Total fluid ounces logged for a day.
    pub fn day_total(&self, day: Date) -> Result<f64> {
        let total = self
            .conn
            .query_row(
                "SELECT fl_oz FROM daily_intake WHERE day = ?1",
                params![day_key(day)?],
                |row| row.get::<_, f64>(0),
            )
            .optional()?;
        Ok(total.unwrap_or(0.0))
    }

    /// Add fluid ounces to a day's total, returning the new total.
    pub fn add_intake(&self, day: Date, fl_oz: f64) -> Result<f64> {
        let key = day_key(day)?;
        self.conn.execute(
            "INSERT INTO daily_intake (day, fl_oz) VALUES (?1, ?2)
             ON CONFLICT(day) DO UPDATE SET fl_oz = fl_oz + ?2",
            params![key, fl_oz],
        )?;
        self.day_total(day)
    }

    // === Intake log ===

    /// Append one intake event to the log.
    pub fn log_intake(&self, ml: f64, fl_oz: f64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO intake_log (logged_at, ml, fl_oz) VALUES (?1, ?2, ?3)",
            params![OffsetDateTime::now_utc().unix_timestamp(), ml, fl_oz],
        )?;
        Ok(())
    }

    /// The most recent intake events, newest first.
    pub fn recent_intakes(&self, limit: u32) -> Result<Vec<IntakeRecord>> {
        let mut statement = self.conn.prepare(
            "SELECT logged_at, ml, fl_oz FROM intake_log
             ORDER BY logged_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = statement.query_map(params![limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (logged_at, ml, fl_oz) = row?;
            let logged_at = OffsetDateTime::from_unix_timestamp(logged_at)
                .map_err(|e| Error::InvalidTimestamp(e.to_string()))?;
            records.push(IntakeRecord { logged_at, ml, fl_oz });
        }
        Ok(records)
    }

    // === Event commit ===

    /// Commit a classified intake event in one transaction.
    ///
    /// Classification itself is pure; this is the single place its state
    /// changes land, so classifying the same reading twice without calling
    /// this cannot double-count anything.
    pub fn apply_event(&mut self, day: Date, event: &IntakeEvent) -> Result<()> {
        let tx = self.conn.transaction()?;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        match event {
            IntakeEvent::BaselineEstablished { ml } | IntakeEvent::Refilled { ml } => {
                tx.execute(
                    "INSERT OR REPLACE INTO baseline (id, ml, recorded_at) VALUES (1, ?1, ?2)",
                    params![ml, now],
                )?;
            }
            IntakeEvent::Consumed {
                ml,
                fl_oz,
                remaining_ml,
            } => {
                tx.execute(
                    "INSERT OR REPLACE INTO baseline (id, ml, recorded_at) VALUES (1, ?1, ?2)",
                    params![remaining_ml, now],
                )?;
                tx.execute(
                    "INSERT INTO daily_intake (day, fl_oz) VALUES (?1, ?2)
                     ON CONFLICT(day) DO UPDATE SET fl_oz = fl_oz + ?2",
                    params![day_key(day)?, fl_oz],
                )?;
                tx.execute(
                    "INSERT INTO intake_log (logged_at, ml, fl_oz) VALUES (?1, ?2, ?3)",
                    params![now, ml, fl_oz],
                )?;
            }
            IntakeEvent::NoChange => {}
        }

        tx.commit()?;
        Ok(())
    }
}

fn day_key(day: Date) -> Result<String> {
    day.format(DAY_FORMAT)
        .map_err(|e| Error::InvalidTimestamp(e.to_string()))
}

/// Initialize the database schema.
fn initialize(conn: &Connection) -> Result<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version == 0 {
        conn.execute_batch(
            r#"
            -- Last bottle reading used as the consumption reference point
            CREATE TABLE IF NOT EXISTS baseline (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                ml REAL NOT NULL,
                recorded_at INTEGER NOT NULL
            );

            -- Accumulated intake per calendar day
            CREATE TABLE IF NOT EXISTS daily_intake (
                day TEXT PRIMARY KEY,
                fl_oz REAL NOT NULL
            );

            -- Append-only log of individual intake events
            CREATE TABLE IF NOT EXISTS intake_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                logged_at INTEGER NOT NULL,
                ml REAL NOT NULL,
                fl_oz REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_intake_log_time ON intake_log(logged_at);
            "#,
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    // Future migrations branch on `version` here.

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_baseline_round_trip() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.baseline().unwrap(), None);

        store.set_baseline(512.0).unwrap();
        let baseline = store.baseline().unwrap().unwrap();
        assert_eq!(baseline.ml, 512.0);

        store.set_baseline(400.0).unwrap();
        assert_eq!(store.baseline().unwrap().unwrap().ml, 400.0);

        store.clear_baseline().unwrap();
        assert_eq!(store.baseline().unwrap(), None);
    }

    #[test]
    fn test_daily_intake_accumulates() {
        let store = Store::open_in_memory().unwrap();
        let day = date!(2026 - 08 - 06);

        assert_eq!(store.day_total(day).unwrap(), 0.0);
        assert_eq!(store.add_intake(day, 3.38).unwrap(), 3.38);
        let total = store.add_intake(day, 1.69).unwrap();
        assert!((total - 5.07).abs() < 1e-9);
    }

    #[test]
    fn test_days_are_isolated() {
        let store = Store::open_in_memory().unwrap();
        store.add_intake(date!(2026 - 08 - 05), 10.0).unwrap();
        store.add_intake(date!(2026 - 08 - 06), 2.5).unwrap();

        assert_eq!(store.day_total(date!(2026 - 08 - 05)).unwrap(), 10.0);
        assert_eq!(store.day_total(date!(2026 - 08 - 06)).unwrap(), 2.5);
        assert_eq!(store.day_total(date!(2026 - 08 - 07)).unwrap(), 0.0);
    }

    #[test]
    fn test_intake_log_ordering() {
        let store = Store::open_in_memory().unwrap();
        store.log_intake(100.0, 3.38).unwrap();
        store.log_intake(50.0, 1.69).unwrap();
        store.log_intake(200.0, 6.76).unwrap();

        let records = store.recent_intakes(2).unwrap();
        assert_eq!(records.len(), 2);
        // Newest first; same-second inserts fall back to insertion order.
        assert_eq!(records[0].ml, 200.0);
        assert_eq!(records[1].ml, 50.0);
    }

    #[test]
    fn test_apply_consumed_event() {
        let mut store = Store::open_in_memory().unwrap();
        let day = date!(2026 - 08 - 06);
        store.set_baseline(500.0).unwrap();

        let event = IntakeEvent::Consumed {
            ml: 100.0,
            fl_oz: 3.38,
            remaining_ml: 400.0,
        };
        store.apply_event(day, &event).unwrap();

        assert_eq!(store.baseline().unwrap().unwrap().ml, 400.0);
        assert_eq!(store.day_total(day).unwrap(), 3.38);
        assert_eq!(store.recent_intakes(10).unwrap().len(), 1);
    }

    #[test]
    fn test_apply_refill_event_leaves_intake_alone() {
        let mut store = Store::open_in_memory().unwrap();
        let day = date!(2026 - 08 - 06);
        store.set_baseline(100.0).unwrap();
        store.add_intake(day, 5.0).unwrap();

        store
            .apply_event(day, &IntakeEvent::Refilled { ml: 750.0 })
            .unwrap();

        assert_eq!(store.baseline().unwrap().unwrap().ml, 750.0);
        assert_eq!(store.day_total(day).unwrap(), 5.0);
        assert!(store.recent_intakes(10).unwrap().is_empty());
    }

    #[test]
    fn test_apply_no_change_event_is_a_no_op() {
        let mut store = Store::open_in_memory().unwrap();
        let day = date!(2026 - 08 - 06);
        store.set_baseline(500.0).unwrap();

        store.apply_event(day, &IntakeEvent::NoChange).unwrap();

        assert_eq!(store.baseline().unwrap().unwrap().ml, 500.0);
        assert_eq!(store.day_total(day).unwrap(), 0.0);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");

        {
            let store = Store::open(&path).unwrap();
            store.set_baseline(321.0).unwrap();
            store.add_intake(date!(2026 - 08 - 06), 7.5).unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.baseline().unwrap().unwrap().ml, 321.0);
        assert_eq!(store.day_total(date!(2026 - 08 - 06)).unwrap(), 7.5);
    }
}
