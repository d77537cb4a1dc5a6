//! Error types for geotrack-types.

use thiserror::Error;

/// Errors raised while parsing or validating geotrack values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The value is not a known action name.
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// The integer is not a valid response code.
    #[error("Invalid response code: {0}")]
    InvalidResponseCode(i8),

    /// A coordinate is outside its valid range or not finite.
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
}

/// Result type alias using geotrack-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
