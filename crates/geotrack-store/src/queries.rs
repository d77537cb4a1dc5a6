//! Query builder for stored samples.
//!
//! # Example
//!
//! ```
//! use geotrack_store::{SampleQuery, Store};
//! use time::{Duration, OffsetDateTime};
//!
//! let store = Store::open_in_memory()?;
//! let hour_ago = OffsetDateTime::now_utc() - Duration::hours(1);
//!
//! let query = SampleQuery::new()
//!     .session(7)
//!     .since(hour_ago)
//!     .limit(50);
//! let samples = store.query_samples(&query)?;
//! assert!(samples.is_empty());
//! # Ok::<(), geotrack_store::Error>(())
//! ```

use time::OffsetDateTime;

/// Fluent query builder for samples.
///
/// Use this with [`Store::query_samples`](crate::Store::query_samples). All
/// filters are optional. Results are newest first unless
/// [`oldest_first`](Self::oldest_first) is set.
#[derive(Debug, Default, Clone)]
pub struct SampleQuery {
    /// Filter by owning session.
    pub session_id: Option<i64>,
    /// Samples captured at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Samples captured at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by captured_at descending.
    pub newest_first: bool,
}

impl SampleQuery {
    /// Create a query matching every sample, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Only samples of the given session.
    pub fn session(mut self, session_id: i64) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Only samples captured at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Only samples captured at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the number of results.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Chronological order, as used for export.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(session_id) = self.session_id {
            conditions.push("session_id = ?");
            params.push(Box::new(session_id));
        }

        if let Some(since) = self.since {
            conditions.push("captured_at >= ?");
            params.push(Box::new(since.unix_timestamp()));
        }

        if let Some(until) = self.until {
            conditions.push("captured_at <= ?");
            params.push(Box::new(until.unix_timestamp()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, session_id, latitude, longitude, captured_at \
             FROM samples {} ORDER BY captured_at {}, id {}",
            where_clause, order, order
        );

        // SQLite requires LIMIT before OFFSET
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        sql
    }
}
