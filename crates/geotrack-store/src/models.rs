//! Data models returned by the store.

use serde::{Deserialize, Serialize};

use geotrack_types::Session;

/// A session together with how many samples it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub session: Session,
    /// Number of samples recorded in the session.
    pub sample_count: u64,
}

/// One line of a CSV export.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct CsvSample {
    pub session_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// RFC 3339 timestamp.
    pub captured_at: String,
}
