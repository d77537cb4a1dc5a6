//! Controller snapshot and display keys in the `preferences` table.
//!
//! Values are stored as text. Booleans are `"true"`/`"false"`, ids are decimal
//! integers and the last action is its wire name.

use rusqlite::{Connection, OptionalExtension};
use tracing::warn;

use geotrack_types::{Action, ControllerSnapshot, DEFAULT_DISPLAY_NAME, DEFAULT_DISPLAY_TIME, SessionDisplay};

use crate::error::{Error, Result};

/// Whether a session is open and being recorded.
pub const KEY_OPERATING: &str = "operating";
/// Session the controller records into.
pub const KEY_CURRENT_SESSION_ID: &str = "current_session_id";
/// Last action that changed the controller's course.
pub const KEY_LAST_ACTION: &str = "last_action";
/// Session shown to clients.
pub const KEY_DISPLAY_SESSION_ID: &str = "display_session_id";
/// Display name of that session.
pub const KEY_SESSION_DISPLAY_NAME: &str = "session_display_name";
/// Start time of that session, `YYYY-MM-DD HH:MM:SS`.
pub const KEY_SESSION_START_TIME: &str = "session_start_time";
/// End time of that session, or `-`.
pub const KEY_SESSION_END_TIME: &str = "session_end_time";

pub(crate) fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM preferences WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

pub(crate) fn put(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO preferences (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    )?;
    Ok(())
}

/// Read the snapshot. `None` if the controller never persisted one.
pub(crate) fn load(conn: &Connection) -> Result<Option<ControllerSnapshot>> {
    let operating = get(conn, KEY_OPERATING)?;
    let last_action = get(conn, KEY_LAST_ACTION)?;
    if operating.is_none() && last_action.is_none() {
        return Ok(None);
    }

    let operating = match operating.as_deref() {
        None | Some("false") => false,
        Some("true") => true,
        Some(other) => {
            return Err(Error::InvalidSnapshot {
                key: KEY_OPERATING.to_string(),
                value: other.to_string(),
            });
        }
    };

    // An unreadable id is left as None; the controller treats operating
    // without an id as an inconsistency.
    let current_session_id = match get(conn, KEY_CURRENT_SESSION_ID)? {
        Some(raw) => match raw.parse::<i64>() {
            Ok(id) if id >= 1 => Some(id),
            Ok(_) => None,
            Err(_) => {
                warn!("Ignoring unreadable {}: {:?}", KEY_CURRENT_SESSION_ID, raw);
                None
            }
        },
        None => None,
    };

    let last_action = match last_action {
        Some(raw) => raw.parse::<Action>().unwrap_or_else(|_| {
            warn!("Ignoring unreadable {}: {:?}", KEY_LAST_ACTION, raw);
            Action::Unknown
        }),
        None => Action::None,
    };

    Ok(Some(ControllerSnapshot {
        operating,
        current_session_id,
        last_action,
    }))
}

/// Write every snapshot key.
pub(crate) fn save(conn: &Connection, snapshot: &ControllerSnapshot) -> Result<()> {
    put(
        conn,
        KEY_OPERATING,
        if snapshot.operating { "true" } else { "false" },
    )?;
    let id = snapshot.current_session_id.unwrap_or(0).to_string();
    put(conn, KEY_CURRENT_SESSION_ID, &id)?;
    put(conn, KEY_LAST_ACTION, snapshot.last_action.as_str())?;
    Ok(())
}

/// Read the display keys, falling back to defaults.
pub(crate) fn load_display(conn: &Connection) -> Result<SessionDisplay> {
    let session_id = get(conn, KEY_DISPLAY_SESSION_ID)?
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0);
    Ok(SessionDisplay {
        session_id,
        name: get(conn, KEY_SESSION_DISPLAY_NAME)?
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
        started_at: get(conn, KEY_SESSION_START_TIME)?
            .unwrap_or_else(|| DEFAULT_DISPLAY_TIME.to_string()),
        ended_at: get(conn, KEY_SESSION_END_TIME)?
            .unwrap_or_else(|| DEFAULT_DISPLAY_TIME.to_string()),
    })
}

/// Write every display key.
pub(crate) fn save_display(conn: &Connection, display: &SessionDisplay) -> Result<()> {
    put(conn, KEY_DISPLAY_SESSION_ID, &display.session_id.to_string())?;
    put(conn, KEY_SESSION_DISPLAY_NAME, &display.name)?;
    put(conn, KEY_SESSION_START_TIME, &display.started_at)?;
    put(conn, KEY_SESSION_END_TIME, &display.ended_at)?;
    Ok(())
}
