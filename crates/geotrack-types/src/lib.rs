//! Shared types for the geotrack session recorder.
//!
//! This crate holds the vocabulary spoken between the controller, its storage and
//! its clients:
//!
//! - [`Action`], [`Request`], [`Response`] and [`ResponseCode`] make up the
//!   controller's message protocol
//! - [`Position`], [`Session`] and [`Sample`] describe recorded data
//! - [`ControllerSnapshot`] and [`SessionDisplay`] are the persisted recovery
//!   and display state
//!
//! # Example
//!
//! ```
//! use geotrack_types::{ActionMessage, Request};
//!
//! let message = ActionMessage {
//!     action: "start_session".to_string(),
//!     data: Some("road-1".to_string()),
//! };
//! assert_eq!(
//!     Request::from_message(&message),
//!     Request::StartSession { name: "road-1".to_string() }
//! );
//! ```

pub mod action;
pub mod error;
pub mod types;

pub use action::{
    Action, ActionMessage, REASON_INCONSISTENT, REASON_NO_PERMISSION, REASON_NO_SENSOR, Request,
    Response, ResponseCode,
};
pub use error::{ParseError, ParseResult};
pub use types::{
    ControllerSnapshot, DEFAULT_DISPLAY_NAME, DEFAULT_DISPLAY_TIME, Position, Sample, Session,
    SessionDisplay, format_display_time,
};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use time::macros::datetime;

    // --- Action tests ---

    #[test]
    fn test_action_round_trips_through_name() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn test_action_parse_is_lenient_about_case_and_dashes() {
        assert_eq!(
            "Start-Session".parse::<Action>().unwrap(),
            Action::StartSession
        );
        assert_eq!(" END_SESSION ".parse::<Action>().unwrap(), Action::EndSession);
    }

    #[test]
    fn test_action_parse_unknown() {
        let err = "launch_rockets".parse::<Action>().unwrap_err();
        assert_eq!(err, ParseError::UnknownAction("launch_rockets".to_string()));
        assert!(err.to_string().contains("launch_rockets"));
    }

    #[test]
    fn test_client_facing_actions() {
        let client: Vec<_> = Action::ALL
            .into_iter()
            .filter(Action::is_client_facing)
            .collect();
        assert_eq!(
            client,
            vec![
                Action::StartController,
                Action::StartSession,
                Action::EndSession,
                Action::StopController
            ]
        );
    }

    // --- ResponseCode tests ---

    #[test]
    fn test_response_code_values() {
        assert_eq!(i8::from(ResponseCode::Error), -1);
        assert_eq!(i8::from(ResponseCode::UnknownAction), 0);
        assert_eq!(i8::from(ResponseCode::Empty), 1);
        assert_eq!(i8::from(ResponseCode::NoChange), 2);
        assert_eq!(i8::from(ResponseCode::Ok), 3);
    }

    #[test]
    fn test_response_code_rejects_out_of_range() {
        assert_eq!(
            ResponseCode::try_from(4),
            Err(ParseError::InvalidResponseCode(4))
        );
        assert_eq!(ResponseCode::from_code(-2), None);
    }

    // --- Request tests ---

    #[test]
    fn test_request_from_message_defaults_name_to_empty() {
        let message = ActionMessage::new(Action::StartSession, None);
        assert_eq!(
            Request::from_message(&message),
            Request::StartSession {
                name: String::new()
            }
        );
    }

    #[test]
    fn test_request_from_message_internal_and_unknown() {
        let internal = ActionMessage::new(Action::PositionStopped, None);
        assert_eq!(
            Request::from_message(&internal),
            Request::Internal(Action::PositionStopped)
        );

        let unknown = ActionMessage {
            action: "teleport".to_string(),
            data: None,
        };
        let request = Request::from_message(&unknown);
        assert_eq!(request, Request::Unknown("teleport".to_string()));
        assert_eq!(request.action(), Action::Unknown);
    }

    #[test]
    fn test_request_from_action() {
        assert_eq!(Request::from(Action::EndSession), Request::EndSession);
        assert_eq!(
            Request::from(Action::StopController),
            Request::StopController
        );
        assert_eq!(
            Request::from(Action::Unknown),
            Request::Internal(Action::Unknown)
        );
    }

    // --- Position and snapshot tests ---

    #[test]
    fn test_position_validate_bounds() {
        assert!(Position::new(90.0, 180.0).validate().is_ok());
        assert!(Position::new(-90.0, -180.0).validate().is_ok());
        assert!(Position::new(-90.1, 0.0).validate().is_err());
        assert!(Position::new(0.0, 180.5).validate().is_err());
        assert!(Position::new(f64::INFINITY, 0.0).validate().is_err());
    }

    #[test]
    fn test_snapshot_consistency() {
        assert!(ControllerSnapshot::default().is_consistent());

        let open = ControllerSnapshot {
            operating: true,
            current_session_id: Some(7),
            last_action: Action::None,
        };
        assert!(open.is_consistent());

        let missing = ControllerSnapshot {
            current_session_id: None,
            ..open
        };
        assert!(!missing.is_consistent());

        let zero = ControllerSnapshot {
            current_session_id: Some(0),
            ..open
        };
        assert!(!zero.is_consistent());
    }

    #[test]
    fn test_session_display_from_session() {
        let open = Session {
            id: 3,
            name: String::new(),
            started_at: datetime!(2024-05-01 08:30:00 UTC),
            ended_at: None,
        };
        let display = SessionDisplay::from_session(&open);
        assert_eq!(display.session_id, 3);
        assert_eq!(display.name, DEFAULT_DISPLAY_NAME);
        assert_eq!(display.started_at, "2024-05-01 08:30:00");
        assert_eq!(display.ended_at, DEFAULT_DISPLAY_TIME);

        let closed = Session {
            name: "road-1".to_string(),
            ended_at: Some(datetime!(2024-05-01 09:00:15 UTC)),
            ..open
        };
        let display = SessionDisplay::from_session(&closed);
        assert_eq!(display.name, "road-1");
        assert_eq!(display.ended_at, "2024-05-01 09:00:15");
    }

    // --- Serialization tests ---

    #[cfg(feature = "serde")]
    #[test]
    fn test_response_serialization() {
        let response = Response::error(Action::EndSession, "7");
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(
            json,
            r#"{"action":"end_session","response_code":-1,"data":"7"}"#
        );

        let empty = Response::empty(Action::PositionStopped);
        let json = serde_json::to_string(&empty).unwrap();
        assert_eq!(json, r#"{"action":"position_stopped","response_code":1}"#);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_response_deserialization_rejects_bad_code() {
        let result: Result<Response, _> =
            serde_json::from_str(r#"{"action":"none","response_code":9}"#);
        assert!(result.is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_action_message_deserialization() {
        let message: ActionMessage = serde_json::from_str(r#"{"action":"end_session"}"#).unwrap();
        assert_eq!(message.action, "end_session");
        assert_eq!(message.data, None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_session_serialization_uses_rfc3339() {
        let session = Session {
            id: 1,
            name: "a".to_string(),
            started_at: datetime!(2024-05-01 08:30:00 UTC),
            ended_at: None,
        };
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["started_at"], "2024-05-01T08:30:00Z");
        assert!(json["ended_at"].is_null());
    }

    proptest! {
        #[test]
        fn prop_in_range_positions_validate(lat in -90.0f64..=90.0, lon in -180.0f64..=180.0) {
            prop_assert!(Position::new(lat, lon).validate().is_ok());
        }

        #[test]
        fn prop_unknown_names_never_panic(name in "\\PC*") {
            let message = ActionMessage { action: name, data: None };
            let _ = Request::from_message(&message);
        }
    }
}
