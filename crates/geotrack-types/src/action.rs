//! The controller's message protocol: action topics, requests and responses.
//!
//! Every response published by the controller is tagged with an [`Action`]. Only a
//! handful of actions make sense as requests from a client; those are modelled by
//! [`Request`]. Everything else is a response topic that a client may still send
//! (the channel stays forward compatible) but which the controller ignores.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Payload sent with `PositionStarted`/`ServiceRestarted` errors when the provider is off.
pub const REASON_NO_SENSOR: &str = "no-sensor";
/// Payload sent with `PositionStarted` errors when location permission is missing.
pub const REASON_NO_PERMISSION: &str = "no-permission";
/// Payload sent with `ServiceRestarted` errors when the persisted snapshot is corrupt.
pub const REASON_INCONSISTENT: &str = "internal inconsistency";

/// Every topic of the controller's message channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Action {
    /// Bring the controller up. Client-facing.
    StartController,
    /// Open a new named session and start the position source. Client-facing.
    StartSession,
    /// Close the current session and stop the position source. Client-facing.
    EndSession,
    /// Orderly controller shutdown.
    StopController,
    /// The host is powering off.
    DeviceShuttingDown,
    /// The process was re-created by the host and recovery ran.
    ServiceRestarted,
    /// The position source was started (or failed to start).
    PositionStarted,
    /// The position source was stopped.
    PositionStopped,
    /// The position provider was disabled underneath the controller.
    PositionDisabled,
    /// No action; the resting value of the last-action marker.
    None,
    /// Sentinel for unrecognized actions and for a cleanly stopped controller.
    Unknown,
}

impl Action {
    /// All actions, in declaration order.
    pub const ALL: [Action; 11] = [
        Action::StartController,
        Action::StartSession,
        Action::EndSession,
        Action::StopController,
        Action::DeviceShuttingDown,
        Action::ServiceRestarted,
        Action::PositionStarted,
        Action::PositionStopped,
        Action::PositionDisabled,
        Action::None,
        Action::Unknown,
    ];

    /// Wire name of the action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::StartController => "start_controller",
            Action::StartSession => "start_session",
            Action::EndSession => "end_session",
            Action::StopController => "stop_controller",
            Action::DeviceShuttingDown => "device_shutting_down",
            Action::ServiceRestarted => "service_restarted",
            Action::PositionStarted => "position_started",
            Action::PositionStopped => "position_stopped",
            Action::PositionDisabled => "position_disabled",
            Action::None => "none",
            Action::Unknown => "unknown",
        }
    }

    /// Whether clients are expected to send this action.
    ///
    /// `StopController` is accepted from clients as well, since a client that
    /// detects a broken controller needs a way to tear it down.
    #[must_use]
    pub fn is_client_facing(&self) -> bool {
        matches!(
            self,
            Action::StartController
                | Action::StartSession
                | Action::EndSession
                | Action::StopController
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| ParseError::UnknownAction(s.to_string()))
    }
}

/// Outcome code carried by every [`Response`].
///
/// Serialized as its integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(into = "i8", try_from = "i8"))]
#[repr(i8)]
pub enum ResponseCode {
    Error = -1,
    UnknownAction = 0,
    Empty = 1,
    NoChange = 2,
    Ok = 3,
}

impl From<ResponseCode> for i8 {
    fn from(code: ResponseCode) -> Self {
        code as i8
    }
}

impl ResponseCode {
    /// Look up a code by its integer value.
    #[must_use]
    pub fn from_code(value: i8) -> Option<Self> {
        match value {
            -1 => Some(ResponseCode::Error),
            0 => Some(ResponseCode::UnknownAction),
            1 => Some(ResponseCode::Empty),
            2 => Some(ResponseCode::NoChange),
            3 => Some(ResponseCode::Ok),
            _ => None,
        }
    }
}

impl TryFrom<i8> for ResponseCode {
    type Error = ParseError;

    fn try_from(value: i8) -> Result<Self, ParseError> {
        ResponseCode::from_code(value).ok_or(ParseError::InvalidResponseCode(value))
    }
}

/// A response event published by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Response {
    /// The topic this response answers.
    pub action: Action,
    /// Outcome.
    pub response_code: ResponseCode,
    /// Optional payload, usually an error reason or a session id.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub data: Option<String>,
}

impl Response {
    /// Create a response without payload.
    #[must_use]
    pub fn new(action: Action, response_code: ResponseCode) -> Self {
        Self {
            action,
            response_code,
            data: None,
        }
    }

    /// Create a response carrying a payload.
    #[must_use]
    pub fn with_data(action: Action, response_code: ResponseCode, data: impl Into<String>) -> Self {
        Self {
            action,
            response_code,
            data: Some(data.into()),
        }
    }

    /// Shorthand for an `Empty` response.
    #[must_use]
    pub fn empty(action: Action) -> Self {
        Self::new(action, ResponseCode::Empty)
    }

    /// Shorthand for an `Ok` response.
    #[must_use]
    pub fn ok(action: Action) -> Self {
        Self::new(action, ResponseCode::Ok)
    }

    /// Shorthand for an `Error` response with a reason.
    #[must_use]
    pub fn error(action: Action, reason: impl Into<String>) -> Self {
        Self::with_data(action, ResponseCode::Error, reason)
    }

    /// Whether the response reports a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.response_code == ResponseCode::Error
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:?}", self.action, self.response_code)?;
        if let Some(data) = &self.data {
            write!(f, "({data})")?;
        }
        Ok(())
    }
}

/// A raw action message as it arrives over the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActionMessage {
    /// Action name, e.g. `"start_session"`.
    pub action: String,
    /// Optional payload (the display name for `start_session`).
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub data: Option<String>,
}

impl ActionMessage {
    /// Create a message for an action with optional payload.
    pub fn new(action: Action, data: Option<String>) -> Self {
        Self {
            action: action.as_str().to_string(),
            data,
        }
    }
}

/// A request accepted by the controller's dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    StartController,
    StartSession { name: String },
    EndSession,
    StopController,
    /// A response-only topic sent by a client. Accepted and ignored.
    Internal(Action),
    /// A name that does not match any action.
    Unknown(String),
}

impl Request {
    /// Build a request from a wire message.
    ///
    /// Never fails: unrecognized names become [`Request::Unknown`] so they can be
    /// answered with `UnknownAction`.
    pub fn from_message(message: &ActionMessage) -> Self {
        match message.action.parse::<Action>() {
            Ok(Action::StartController) => Request::StartController,
            Ok(Action::StartSession) => Request::StartSession {
                name: message.data.clone().unwrap_or_default(),
            },
            Ok(Action::EndSession) => Request::EndSession,
            Ok(Action::StopController) => Request::StopController,
            Ok(action) => Request::Internal(action),
            Err(_) => Request::Unknown(message.action.clone()),
        }
    }

    /// The topic this request is filed under.
    #[must_use]
    pub fn action(&self) -> Action {
        match self {
            Request::StartController => Action::StartController,
            Request::StartSession { .. } => Action::StartSession,
            Request::EndSession => Action::EndSession,
            Request::StopController => Action::StopController,
            Request::Internal(action) => *action,
            Request::Unknown(_) => Action::Unknown,
        }
    }
}

impl From<Action> for Request {
    fn from(action: Action) -> Self {
        Request::from_message(&ActionMessage::new(action, None))
    }
}
