//! The session-recording controller.
//!
//! [`Controller`] is a single state machine that owns the position source while a
//! session is open, writes samples into the store and keeps a small persisted
//! snapshot ([`ControllerSnapshot`]) from which a restarted process can pick the
//! session up again.
//!
//! Every entry point takes `&mut self` and runs to completion before the next one
//! starts; the [`runtime`](crate::runtime) drains a single queue to guarantee that.
//! Results are never returned to the caller. Each step instead publishes
//! [`Response`]s on a broadcast channel, and collaborator failures become
//! `Error` responses.
//!
//! # State
//!
//! - [`ServiceState`]: whether a client started the controller.
//! - [`SessionState`]: derived from the snapshot's `operating` flag.
//!
//! # Lock Acquisition
//!
//! The store mutex is taken for single store calls only and never held across a
//! position source call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};

use geotrack_core::{PositionSource, SourceEvent, SourceOptions, SourceReceiver};
use geotrack_store::Store;
use geotrack_types::{
    Action, ControllerSnapshot, REASON_INCONSISTENT, REASON_NO_SENSOR, Request, Response,
    ResponseCode,
};

/// Whether a client started the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    NotStarted,
    Started,
}

/// Whether a session is being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoSession,
    SessionOpen,
}

/// Why the controller is shutting down when no client asked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The host is stopping the process and will start it again. The open
    /// session is kept for [`Controller::resume`].
    Host,
    /// The machine itself is going down. The open session is closed.
    DeviceShuttingDown,
}

/// What the runtime should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Flow {
    Continue,
    Stop,
}

/// Events drained by the runtime, in order.
#[derive(Debug)]
pub(crate) enum Event {
    Request(Request),
    Resume,
    Source(SourceEvent),
    Shutdown(ShutdownReason),
}

/// A point-in-time view of the controller for status endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerStatus {
    pub service: ServiceState,
    pub snapshot: ControllerSnapshot,
}

/// The session-recording state machine.
pub struct Controller {
    store: Arc<Mutex<Store>>,
    source: Arc<dyn PositionSource>,
    responses: broadcast::Sender<Response>,
    options: SourceOptions,
    service: ServiceState,
    snapshot: ControllerSnapshot,
    restored: bool,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("source", &self.source.name())
            .field("service", &self.service)
            .field("snapshot", &self.snapshot)
            .field("restored", &self.restored)
            .finish()
    }
}

impl Controller {
    /// Create the controller and read the persisted snapshot.
    ///
    /// An unreadable snapshot is logged and treated as absent.
    pub async fn init(
        store: Arc<Mutex<Store>>,
        source: Arc<dyn PositionSource>,
        responses: broadcast::Sender<Response>,
        options: SourceOptions,
    ) -> Self {
        let loaded = match store.lock().await.load_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Ignoring unreadable controller snapshot: {}", e);
                None
            }
        };

        match &loaded {
            Some(snapshot) => info!(
                operating = snapshot.operating,
                session_id = ?snapshot.current_session_id,
                last_action = %snapshot.last_action,
                "Restored controller snapshot"
            ),
            None => info!("No controller snapshot, starting fresh"),
        }

        Self {
            store,
            source,
            responses,
            options,
            service: ServiceState::NotStarted,
            snapshot: loaded.unwrap_or_default(),
            restored: loaded.is_some(),
        }
    }

    /// Whether a snapshot was found at init, so [`resume`](Self::resume) is due.
    pub fn has_snapshot(&self) -> bool {
        self.restored
    }

    pub fn service_state(&self) -> ServiceState {
        self.service
    }

    pub fn session_state(&self) -> SessionState {
        if self.snapshot.operating {
            SessionState::SessionOpen
        } else {
            SessionState::NoSession
        }
    }

    /// The in-memory copy of the persisted snapshot.
    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshot
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            service: self.service,
            snapshot: self.snapshot,
        }
    }

    /// Subscribe to the position source's events.
    pub fn subscribe_source(&self) -> SourceReceiver {
        self.source.subscribe()
    }

    pub(crate) async fn process(&mut self, event: Event) -> Flow {
        match event {
            Event::Request(request) => self.handle(request).await,
            Event::Resume => self.resume().await,
            Event::Source(event) => self.on_source_event(event).await,
            Event::Shutdown(reason) => self.shutdown(reason).await,
        }
    }

    /// Handle one client request.
    pub async fn handle(&mut self, request: Request) -> Flow {
        debug!(action = %request.action(), "Handling request");
        match request {
            Request::StartController => {
                self.start_controller().await;
                Flow::Continue
            }
            Request::StartSession { name } => {
                self.start_session(&name).await;
                Flow::Continue
            }
            Request::EndSession => {
                self.end_session().await;
                Flow::Continue
            }
            Request::StopController => {
                self.record_action(Action::StopController).await;
                self.teardown(true).await
            }
            Request::Internal(Action::None) => Flow::Continue,
            Request::Internal(Action::Unknown) => {
                self.unknown_action("unknown").await;
                Flow::Continue
            }
            Request::Internal(action) => {
                debug!(action = %action, "Ignoring response-only action");
                self.record_action(Action::None).await;
                Flow::Continue
            }
            Request::Unknown(name) => {
                self.unknown_action(&name).await;
                Flow::Continue
            }
        }
    }

    /// Pick up where a previous process left off.
    pub async fn resume(&mut self) -> Flow {
        self.restored = false;

        if !self.snapshot.operating {
            info!("Resumed with no open session");
            self.publish(Response::empty(Action::ServiceRestarted));
            return Flow::Continue;
        }

        let Some(session_id) = self.open_session_id().await else {
            error!(
                session_id = ?self.snapshot.current_session_id,
                "Snapshot says operating but has no open session"
            );
            self.publish(Response::error(Action::ServiceRestarted, REASON_INCONSISTENT));
            self.record_action(Action::StopController).await;
            return self.teardown(true).await;
        };

        match self.source.start(&self.options).await {
            Ok(()) => {
                info!(session_id, "Resumed recording");
                self.publish(Response::empty(Action::ServiceRestarted));
            }
            Err(e) => {
                warn!(session_id, "Position source failed to restart: {}", e);
                self.publish(Response::error(Action::ServiceRestarted, REASON_NO_SENSOR));
                self.snapshot.operating = false;
                self.publish(Response::error(Action::PositionStarted, REASON_NO_SENSOR));
                self.close_current(Action::None).await;
            }
        }
        Flow::Continue
    }

    /// React to an event from the position source.
    pub async fn on_source_event(&mut self, event: SourceEvent) -> Flow {
        if event.is_provider_loss() {
            if !self.snapshot.operating {
                debug!("Provider lost while idle");
                return Flow::Continue;
            }
            warn!("Position provider disabled, stopping");
            self.record_action(Action::PositionDisabled).await;
            self.publish(Response::empty(Action::PositionDisabled));
            self.record_action(Action::StopController).await;
            return self.teardown(true).await;
        }

        match event {
            SourceEvent::Fix { position } => {
                if let Err(e) = position.validate() {
                    warn!("Discarding invalid fix: {}", e);
                    return Flow::Continue;
                }
                let session_id = match (self.snapshot.operating, self.snapshot.current_session_id)
                {
                    (true, Some(id)) => id,
                    _ => {
                        debug!("Discarding fix outside a session");
                        return Flow::Continue;
                    }
                };
                let store = self.store.lock().await;
                if let Err(e) = store.append_sample(session_id, &position) {
                    error!(session_id, "Failed to store sample: {}", e);
                }
            }
            SourceEvent::StatusChanged { status } => {
                info!(status = ?status, "Position provider status changed");
            }
            SourceEvent::ProviderEnabled => info!("Position provider enabled"),
            other => debug!(event = ?other, "Ignoring source event"),
        }
        Flow::Continue
    }

    /// Shut down for a reason outside the request protocol.
    pub async fn shutdown(&mut self, reason: ShutdownReason) -> Flow {
        info!(reason = ?reason, "Shutdown requested");
        if reason == ShutdownReason::DeviceShuttingDown {
            self.record_action(Action::DeviceShuttingDown).await;
            self.publish(Response::empty(Action::DeviceShuttingDown));
        }
        self.teardown(true).await
    }

    async fn start_controller(&mut self) {
        self.record_action(Action::None).await;
        if self.service == ServiceState::Started {
            self.publish(Response::new(Action::StartController, ResponseCode::NoChange));
        } else {
            self.service = ServiceState::Started;
            info!("Controller started");
            self.publish(Response::ok(Action::StartController));
        }
    }

    async fn start_session(&mut self, name: &str) {
        // A failed close leaves the session open in the store with operating=false.
        let open = if self.snapshot.operating {
            Some(self.snapshot.current_session_id.unwrap_or(0))
        } else {
            self.open_session_id().await
        };
        if let Some(open) = open {
            warn!(session_id = open, "Session already open, not starting another");
            self.publish(Response::error(
                Action::StartSession,
                format!("session {open} already open"),
            ));
            return;
        }

        if let Err(e) = self.source.start(&self.options).await {
            warn!("Position source failed to start: {}", e);
            let reasons = match &e {
                geotrack_core::Error::Unavailable(availability) => availability.reasons(),
                _ => vec![REASON_NO_SENSOR],
            };
            for reason in &reasons {
                self.publish(Response::error(Action::PositionStarted, *reason));
            }
            self.publish(Response::error(Action::StartSession, reasons.join(", ")));
            self.snapshot.operating = false;
            self.record_action(Action::None).await;
            return;
        }
        self.publish(Response::empty(Action::PositionStarted));

        let begun = self.store.lock().await.begin_session(name);
        match begun {
            Ok(session) => {
                self.snapshot = ControllerSnapshot {
                    operating: true,
                    current_session_id: Some(session.id),
                    last_action: Action::None,
                };
                info!(session_id = session.id, name = %session.name, "Session started");
                self.publish(Response::with_data(
                    Action::StartSession,
                    ResponseCode::Ok,
                    session.id.to_string(),
                ));
            }
            Err(e) => {
                error!("Failed to create session: {}", e);
                self.stop_source().await;
                self.publish(Response::empty(Action::PositionStopped));
                self.publish(Response::error(Action::StartSession, e.to_string()));
                self.snapshot.operating = false;
                self.snapshot.last_action = Action::None;
                self.save().await;
            }
        }
    }

    async fn end_session(&mut self) {
        // Retrying a failed close is not a protocol error.
        let had_session = self.snapshot.operating || self.open_session_id().await.is_some();

        self.stop_source().await;
        self.publish(Response::empty(Action::PositionStopped));
        self.close_current(Action::None).await;

        if !had_session {
            // Ending a session that was never open restarts the controller.
            warn!("EndSession without an open session, restarting controller");
            self.record_action(Action::StopController).await;
            let _ = self.teardown(false).await;
            self.service = ServiceState::Started;
            self.publish(Response::ok(Action::StartController));
        }
    }

    async fn unknown_action(&mut self, name: &str) {
        warn!(action = name, "Unknown action");
        self.record_action(Action::None).await;
        self.publish(Response::with_data(
            Action::Unknown,
            ResponseCode::UnknownAction,
            name,
        ));
    }

    /// Stop recording and return to `NotStarted`.
    ///
    /// For explicit stops the open session is closed and the snapshot cleared;
    /// otherwise the snapshot is left as is for the next process to resume.
    async fn teardown(&mut self, release: bool) -> Flow {
        if self.snapshot.operating {
            self.stop_source().await;
            self.publish(Response::empty(Action::PositionStopped));
        }

        let explicit = matches!(
            self.snapshot.last_action,
            Action::StopController | Action::PositionDisabled | Action::DeviceShuttingDown
        );
        if explicit {
            if self.snapshot.current_session_id.is_some() {
                self.close_current(Action::Unknown).await;
            } else {
                self.snapshot.operating = false;
                self.snapshot.last_action = Action::Unknown;
                self.save().await;
            }
            self.publish(Response::ok(Action::StopController));
        } else {
            info!(
                session_id = ?self.snapshot.current_session_id,
                "Stopping without closing the session"
            );
            self.publish(Response::empty(Action::StopController));
        }

        if release {
            let store = self.store.lock().await;
            if let Err(e) = store.checkpoint() {
                warn!("Failed to checkpoint database: {}", e);
            }
        }
        self.service = ServiceState::NotStarted;
        info!("Controller stopped");
        Flow::Stop
    }

    /// Close the current session together with the snapshot update.
    ///
    /// `operating` always ends up false. The id is cleared only if the close
    /// succeeded, so a failed close can be retried by a later EndSession.
    async fn close_current(&mut self, last_action: Action) {
        let session_id = self.snapshot.current_session_id;
        let finished = self
            .store
            .lock()
            .await
            .finish_session(session_id, last_action);

        self.snapshot.operating = false;
        self.snapshot.last_action = last_action;
        match finished {
            Ok(Some(session)) => {
                info!(session_id = session.id, "Session ended");
                self.snapshot.current_session_id = None;
                self.publish(Response::ok(Action::EndSession));
            }
            Ok(None) => {
                let id = session_id.unwrap_or(0);
                warn!(session_id = id, "Session could not be closed");
                self.publish(Response::error(Action::EndSession, id.to_string()));
            }
            Err(e) => {
                let id = session_id.unwrap_or(0);
                error!(session_id = id, "Failed to close session: {}", e);
                // The transaction rolled back; persist the idle state on its own.
                self.save().await;
                self.publish(Response::error(Action::EndSession, id.to_string()));
            }
        }
    }

    /// The snapshot's session id, if it names a session that is open in the store.
    async fn open_session_id(&self) -> Option<i64> {
        let id = self.snapshot.current_session_id.filter(|id| *id >= 1)?;
        match self.store.lock().await.get_session(id) {
            Ok(Some(session)) if session.is_open() => Some(id),
            Ok(_) => None,
            Err(e) => {
                error!(session_id = id, "Failed to look up session: {}", e);
                None
            }
        }
    }

    async fn stop_source(&self) {
        if let Err(e) = self.source.stop().await {
            warn!("Failed to stop position source: {}", e);
        }
    }

    async fn record_action(&mut self, action: Action) {
        self.snapshot.last_action = action;
        self.save().await;
    }

    async fn save(&self) {
        let store = self.store.lock().await;
        if let Err(e) = store.save_snapshot(&self.snapshot) {
            error!("Failed to persist controller snapshot: {}", e);
        }
    }

    fn publish(&self, response: Response) {
        debug!(response = %response, "Publishing");
        // No subscribers is fine.
        let _ = self.responses.send(response);
    }
}
