//! Application state shared across handlers.
//!
//! # Broadcast Channel Behavior
//!
//! Controller responses are published on `responses_tx` and forwarded to
//! WebSocket clients:
//!
//! - **Buffer size**: Configurable via `server.broadcast_buffer` (default: 100)
//! - **Message loss**: If a subscriber falls behind and the buffer fills, old messages are dropped
//! - **No blocking**: The controller never waits for subscribers

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use geotrack_core::PositionSource;
use geotrack_store::Store;
use geotrack_types::Response;

use crate::config::Config;
use crate::controller::Controller;
use crate::runtime::{self, ControllerHandle};

/// Shared application state.
pub struct AppState {
    /// The data store, shared with the controller.
    pub store: Arc<Mutex<Store>>,
    pub config: Config,
    /// Broadcast channel of controller responses.
    pub responses_tx: broadcast::Sender<Response>,
    /// Handle to the running controller.
    pub controller: ControllerHandle,
    /// Name of the configured position source.
    pub source_name: String,
}

impl AppState {
    /// Initialize the controller, start its runtime and build the state around it.
    ///
    /// Returns the state and the controller task, which finishes once the
    /// controller stops.
    pub async fn start(
        store: Store,
        source: Arc<dyn PositionSource>,
        config: Config,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let store = Arc::new(Mutex::new(store));
        let (responses_tx, _) = broadcast::channel(config.server.broadcast_buffer.max(1));
        let source_name = source.name().to_string();

        let controller = Controller::init(
            Arc::clone(&store),
            source,
            responses_tx.clone(),
            config.position.source_options(),
        )
        .await;
        let (handle, task) = runtime::spawn(controller, config.server.queue_capacity);

        let state = Arc::new(Self {
            store,
            config,
            responses_tx,
            controller: handle,
            source_name,
        });
        (state, task)
    }
}
