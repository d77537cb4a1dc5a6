//! Error types for geotrack-core.
//!
//! Position sources report two kinds of failure: the source cannot be used right
//! now ([`Error::Unavailable`], recoverable by the user outside the process), or
//! something went wrong while talking to it.

use std::fmt;

use thiserror::Error;

use geotrack_types::{REASON_NO_PERMISSION, REASON_NO_SENSOR};

/// Errors that can occur when operating a position source.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Permission is missing or the provider is disabled.
    #[error("Position source unavailable: {0}")]
    Unavailable(Availability),

    /// A sentence from the receiver could not be parsed.
    #[error("Invalid NMEA sentence: {0}")]
    InvalidSentence(String),

    /// Invalid source configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias using geotrack-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// The two independently observable conditions a source needs to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    /// The process may read from the provider.
    pub permission_granted: bool,
    /// The provider exists and is switched on.
    pub provider_enabled: bool,
}

impl Availability {
    /// Both conditions hold.
    pub const AVAILABLE: Availability = Availability {
        permission_granted: true,
        provider_enabled: true,
    };

    /// Whether the source can be started.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.permission_granted && self.provider_enabled
    }

    /// Failure reasons in reporting order: provider first, then permission.
    #[must_use]
    pub fn reasons(&self) -> Vec<&'static str> {
        let mut reasons = Vec::new();
        if !self.provider_enabled {
            reasons.push(REASON_NO_SENSOR);
        }
        if !self.permission_granted {
            reasons.push(REASON_NO_PERMISSION);
        }
        reasons
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_available() {
            f.write_str("available")
        } else {
            f.write_str(&self.reasons().join(", "))
        }
    }
}
