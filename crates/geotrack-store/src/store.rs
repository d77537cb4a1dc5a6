//! Main store implementation.

use std::io::Write;
use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use geotrack_types::{Action, ControllerSnapshot, Position, Sample, Session, SessionDisplay};

use crate::error::{Error, Result};
use crate::models::{CsvSample, SessionSummary};
use crate::queries::SampleQuery;
use crate::{schema, snapshot};

/// SQLite-based store for sessions, samples and the controller snapshot.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
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

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Flush the write-ahead log into the main database file.
    ///
    /// Called when the controller shuts down so that the file on disk is complete
    /// even if the process is killed right after.
    pub fn checkpoint(&self) -> Result<()> {
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        debug!("Database checkpoint complete");
        Ok(())
    }
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let raw: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<OffsetDateTime>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(_) => timestamp(row, idx).map(Some),
        None => Ok(None),
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        name: row.get(1)?,
        started_at: timestamp(row, 2)?,
        ended_at: optional_timestamp(row, 3)?,
    })
}

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<Sample> {
    Ok(Sample {
        id: row.get(0)?,
        session_id: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        captured_at: timestamp(row, 4)?,
    })
}

const SESSION_COLUMNS: &str = "id, name, started_at, ended_at";

fn insert_session(conn: &Connection, name: &str) -> Result<Session> {
    let name = name.trim();
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO sessions (name, started_at) VALUES (?1, ?2)",
        rusqlite::params![name, now],
    )?;
    let id = conn.last_insert_rowid();
    select_session(conn, id)?.ok_or(Error::Database(rusqlite::Error::QueryReturnedNoRows))
}

fn select_session(conn: &Connection, id: i64) -> Result<Option<Session>> {
    let session = conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
            [id],
            session_from_row,
        )
        .optional()?;
    Ok(session)
}

/// Set `ended_at` on an open session. `None` if nothing changed.
fn end_session(conn: &Connection, id: i64) -> Result<Option<Session>> {
    if id < 1 {
        return Ok(None);
    }
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let changed = conn.execute(
        "UPDATE sessions SET ended_at = MAX(?1, started_at) WHERE id = ?2 AND ended_at IS NULL",
        rusqlite::params![now, id],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    select_session(conn, id)
}

// Session operations
impl Store {
    /// Create a new open session. The name is trimmed.
    pub fn create_session(&self, name: &str) -> Result<Session> {
        let session = insert_session(&self.conn, name)?;
        info!("Created session {} ({:?})", session.id, session.name);
        Ok(session)
    }

    /// Get a session by id.
    pub fn get_session(&self, id: i64) -> Result<Option<Session>> {
        select_session(&self.conn, id)
    }

    /// Close an open session.
    ///
    /// Returns `Ok(None)` without changing anything when the id is not positive,
    /// the session does not exist, or it is already closed. The end timestamp is
    /// written at most once.
    pub fn close_session(&self, id: i64) -> Result<Option<Session>> {
        let closed = end_session(&self.conn, id)?;
        match &closed {
            Some(_) => info!("Closed session {}", id),
            None => debug!("Session {} not closed: missing or already closed", id),
        }
        Ok(closed)
    }

    /// List sessions, newest first.
    pub fn list_sessions(&self, limit: Option<u32>) -> Result<Vec<Session>> {
        let mut sql = format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY id DESC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let mut stmt = self.conn.prepare(&sql)?;
        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Sessions with no end timestamp.
    pub fn open_sessions(&self) -> Result<Vec<Session>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE ended_at IS NULL ORDER BY id"
        ))?;
        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// A session with its sample count.
    pub fn session_summary(&self, id: i64) -> Result<Option<SessionSummary>> {
        let Some(session) = self.get_session(id)? else {
            return Ok(None);
        };
        let sample_count = self.count_samples(Some(id))?;
        Ok(Some(SessionSummary {
            session,
            sample_count,
        }))
    }
}

// Sample operations
impl Store {
    /// Append a sample to an open session.
    ///
    /// Runs in a transaction. Fails with [`Error::SessionNotOpen`] if the session
    /// is missing or closed. The capture time defaults to now.
    pub fn append_sample(&self, session_id: i64, position: &Position) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;

        let open: Option<bool> = tx
            .query_row(
                "SELECT ended_at IS NULL FROM sessions WHERE id = ?1",
                [session_id],
                |row| row.get(0),
            )
            .optional()?;
        if open != Some(true) {
            return Err(Error::SessionNotOpen(session_id));
        }

        let captured_at = position
            .captured_at
            .unwrap_or_else(OffsetDateTime::now_utc)
            .unix_timestamp();
        tx.execute(
            "INSERT INTO samples (session_id, latitude, longitude, captured_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                session_id,
                position.latitude,
                position.longitude,
                captured_at
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!("Appended sample {} to session {}", id, session_id);
        Ok(id)
    }

    /// Query samples with filters.
    pub fn query_samples(&self, query: &SampleQuery) -> Result<Vec<Sample>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let samples = stmt
            .query_map(params_ref.as_slice(), sample_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(samples)
    }

    /// Count samples, optionally for a single session.
    pub fn count_samples(&self, session_id: Option<i64>) -> Result<u64> {
        let count: i64 = match session_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM samples WHERE session_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }

    /// Write a session's samples as CSV, oldest first. Returns the row count.
    pub fn export_samples_csv<W: Write>(&self, session_id: i64, writer: W) -> Result<usize> {
        let samples = self.query_samples(&SampleQuery::new().session(session_id).oldest_first())?;
        let mut csv = csv::Writer::from_writer(writer);
        for sample in &samples {
            let captured_at = sample
                .captured_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| sample.captured_at.unix_timestamp().to_string());
            csv.serialize(CsvSample {
                session_id: sample.session_id,
                latitude: sample.latitude,
                longitude: sample.longitude,
                captured_at,
            })?;
        }
        csv.flush()?;
        info!("Exported {} samples of session {}", samples.len(), session_id);
        Ok(samples.len())
    }
}

// Snapshot operations
impl Store {
    /// Read the controller snapshot. `None` if none was ever written.
    pub fn load_snapshot(&self) -> Result<Option<ControllerSnapshot>> {
        snapshot::load(&self.conn)
    }

    /// Persist the controller snapshot.
    pub fn save_snapshot(&self, value: &ControllerSnapshot) -> Result<()> {
        snapshot::save(&self.conn, value)
    }

    /// Read the display keys.
    pub fn load_display(&self) -> Result<SessionDisplay> {
        snapshot::load_display(&self.conn)
    }

    /// Open a session and record it as current, in one transaction.
    ///
    /// Afterwards the snapshot reads `{operating: true, current_session_id: id,
    /// last_action: None}` and the display keys describe the new session.
    pub fn begin_session(&self, name: &str) -> Result<Session> {
        let tx = self.conn.unchecked_transaction()?;
        let session = insert_session(&tx, name)?;
        snapshot::save(
            &tx,
            &ControllerSnapshot {
                operating: true,
                current_session_id: Some(session.id),
                last_action: Action::None,
            },
        )?;
        snapshot::save_display(&tx, &SessionDisplay::from_session(&session))?;
        tx.commit()?;

        info!("Began session {} ({:?})", session.id, session.name);
        Ok(session)
    }

    /// Close the current session and record the controller as idle, in one transaction.
    ///
    /// `operating` is always persisted as false. If the session was closed its id
    /// is cleared and the display end time is set; otherwise the id is kept so a
    /// later attempt can retry. Returns the closed session, if any.
    pub fn finish_session(
        &self,
        session_id: Option<i64>,
        last_action: Action,
    ) -> Result<Option<Session>> {
        let tx = self.conn.unchecked_transaction()?;
        let closed = match session_id {
            Some(id) => end_session(&tx, id)?,
            None => None,
        };

        let current_session_id = if closed.is_some() { None } else { session_id };
        snapshot::save(
            &tx,
            &ControllerSnapshot {
                operating: false,
                current_session_id,
                last_action,
            },
        )?;
        if let Some(session) = &closed {
            snapshot::save_display(&tx, &SessionDisplay::from_session(session))?;
        }
        tx.commit()?;

        match &closed {
            Some(session) => info!("Finished session {}", session.id),
            None => debug!("No session finished (requested {:?})", session_id),
        }
        Ok(closed)
    }
}
