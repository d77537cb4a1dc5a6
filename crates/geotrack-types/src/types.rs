//! Core domain types: position fixes, sessions, samples and the controller snapshot.

use time::OffsetDateTime;
use time::macros::format_description;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::ParseError;

/// Display name used when a session has no stored display name.
pub const DEFAULT_DISPLAY_NAME: &str = "Unnamed";

/// Display text used for an unknown start or end time.
pub const DEFAULT_DISPLAY_TIME: &str = "-";

/// A single position fix reported by a position source.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    /// Latitude in decimal degrees, positive north.
    pub latitude: f64,
    /// Longitude in decimal degrees, positive east.
    pub longitude: f64,
    /// When the source captured the fix, if it reports one.
    #[cfg_attr(
        feature = "serde",
        serde(
            default,
            with = "time::serde::rfc3339::option",
            skip_serializing_if = "Option::is_none"
        )
    )]
    pub captured_at: Option<OffsetDateTime>,
}

impl Position {
    /// Create a fix without a capture time.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            captured_at: None,
        }
    }

    /// Attach a capture time.
    #[must_use]
    pub fn with_captured_at(mut self, captured_at: OffsetDateTime) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    /// Check that both coordinates are finite and within range.
    ///
    /// # Examples
    ///
    /// ```
    /// use geotrack_types::Position;
    ///
    /// assert!(Position::new(4.6, -74.08).validate().is_ok());
    /// assert!(Position::new(91.0, 0.0).validate().is_err());
    /// assert!(Position::new(0.0, f64::NAN).validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ParseError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ParseError::InvalidCoordinate(format!(
                "latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ParseError::InvalidCoordinate(format!(
                "longitude {} outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// One contiguous recording interval.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Session {
    /// Store-assigned identifier, starting at 1.
    pub id: i64,
    /// Free-text name, possibly empty.
    pub name: String,
    /// When the session was opened.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub started_at: OffsetDateTime,
    /// When the session was closed. `None` while open.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub ended_at: Option<OffsetDateTime>,
}

impl Session {
    /// Whether the session is still accepting samples.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// A stored position fix belonging to a session.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    /// Row identifier.
    pub id: i64,
    /// Owning session.
    pub session_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// When the sample was captured.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub captured_at: OffsetDateTime,
}

/// The controller's persisted recovery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ControllerSnapshot {
    /// A session is open and samples are being recorded.
    pub operating: bool,
    /// The session the controller is recording into, or last failed to close.
    pub current_session_id: Option<i64>,
    /// The last action that changed the controller's course.
    pub last_action: Action,
}

impl Default for ControllerSnapshot {
    fn default() -> Self {
        Self {
            operating: false,
            current_session_id: None,
            last_action: Action::None,
        }
    }
}

impl ControllerSnapshot {
    /// Whether `operating` agrees with a usable session id.
    ///
    /// This only checks the snapshot itself; whether the session is actually open
    /// in the store is the caller's concern.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        !self.operating || self.current_session_id.is_some_and(|id| id >= 1)
    }
}

/// Best-effort session details for display. May lag behind the store.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SessionDisplay {
    /// Session the details belong to, 0 if none.
    pub session_id: i64,
    pub name: String,
    /// Start time, `YYYY-MM-DD HH:MM:SS`.
    pub started_at: String,
    /// End time, `YYYY-MM-DD HH:MM:SS`, or `-` while open.
    pub ended_at: String,
}

impl Default for SessionDisplay {
    fn default() -> Self {
        Self {
            session_id: 0,
            name: DEFAULT_DISPLAY_NAME.to_string(),
            started_at: DEFAULT_DISPLAY_TIME.to_string(),
            ended_at: DEFAULT_DISPLAY_TIME.to_string(),
        }
    }
}

impl SessionDisplay {
    /// Build display details from a session.
    pub fn from_session(session: &Session) -> Self {
        let name = if session.name.is_empty() {
            DEFAULT_DISPLAY_NAME.to_string()
        } else {
            session.name.clone()
        };
        Self {
            session_id: session.id,
            name,
            started_at: format_display_time(session.started_at),
            ended_at: session
                .ended_at
                .map(format_display_time)
                .unwrap_or_else(|| DEFAULT_DISPLAY_TIME.to_string()),
        }
    }
}

/// Format a timestamp as `YYYY-MM-DD HH:MM:SS` in UTC.
///
/// # Examples
///
/// ```
/// use geotrack_types::format_display_time;
/// use time::macros::datetime;
///
/// assert_eq!(format_display_time(datetime!(2024-03-09 07:05:01 UTC)), "2024-03-09 07:05:01");
/// ```
pub fn format_display_time(at: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    at.to_offset(time::UtcOffset::UTC)
        .format(&format)
        .unwrap_or_else(|_| DEFAULT_DISPLAY_TIME.to_string())
}
