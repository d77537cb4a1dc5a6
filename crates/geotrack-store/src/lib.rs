//! Local persistence for geotrack sessions.
//!
//! This crate provides SQLite-based storage for recording sessions, the position
//! samples captured in them, and the small key/value snapshot the controller uses
//! to survive restarts.
//!
//! # Features
//!
//! - Sessions with a one-shot end timestamp
//! - Samples that can only be appended to open sessions
//! - Atomic "begin" and "finish" of the current session together with the snapshot
//! - Query by session and time range, with pagination
//! - CSV export
//!
//! # Example
//!
//! ```no_run
//! use geotrack_store::{SampleQuery, Store};
//!
//! let store = Store::open_default()?;
//!
//! for session in store.list_sessions(Some(10))? {
//!     let samples = store.query_samples(&SampleQuery::new().session(session.id))?;
//!     println!("{} {:?}: {} samples", session.id, session.name, samples.len());
//! }
//! # Ok::<(), geotrack_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod snapshot;
mod store;

pub use error::{Error, Result};
pub use models::SessionSummary;
pub use queries::SampleQuery;
pub use snapshot::{
    KEY_CURRENT_SESSION_ID, KEY_DISPLAY_SESSION_ID, KEY_LAST_ACTION, KEY_OPERATING,
    KEY_SESSION_DISPLAY_NAME, KEY_SESSION_END_TIME, KEY_SESSION_START_TIME,
};
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/geotrack/data.db`
/// - macOS: `~/Library/Application Support/geotrack/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\geotrack\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("geotrack")
        .join("data.db")
}
