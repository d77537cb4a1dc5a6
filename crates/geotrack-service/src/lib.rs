//! Session-recording controller and HTTP API for GPS position sources.
//!
//! This crate provides a service that:
//! - Runs the [`Controller`], which records position fixes into named sessions
//! - Persists a small snapshot so a restarted process resumes the open session
//! - Exposes a REST API for sending actions and querying sessions
//! - Streams controller responses over a WebSocket
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Controller state and current session display
//! - `POST /api/actions` - Queue an action (`{"action": "start_session", "data": "road-1"}`)
//! - `GET /api/sessions` - List sessions, newest first
//! - `GET /api/sessions/{id}` - Session with sample count
//! - `GET /api/sessions/{id}/samples` - Query samples with filters
//! - `GET /api/sessions/{id}/export.csv` - Samples as CSV
//! - `WS /api/ws` - Controller response stream
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/geotrack/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8484"
//!
//! [storage]
//! path = "~/.local/share/geotrack/data.db"
//!
//! [position]
//! source = "nmea"
//! device = "/dev/ttyACM0"
//! min_interval_ms = 5000
//!
//! [controller]
//! terminate_closes_session = false
//! ```

pub mod api;
pub mod config;
pub mod controller;
pub mod runtime;
pub mod state;
pub mod ws;

pub use config::{
    Config, ConfigError, ControllerConfig, PositionConfig, ServerConfig, SimulatedConfig,
    SourceKind, StorageConfig,
};
pub use controller::{
    Controller, ControllerStatus, Flow, ServiceState, SessionState, ShutdownReason,
};
pub use runtime::{ControllerError, ControllerHandle};
pub use state::AppState;
