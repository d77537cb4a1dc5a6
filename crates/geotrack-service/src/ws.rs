//! WebSocket stream of controller responses.
//!
//! A client first receives the current [`StatusResponse`], then every response
//! the controller publishes, as `{"action", "response_code", "data"?}` objects.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::api::StatusResponse;
use crate::state::AppState;

/// Create the WebSocket router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/ws", get(ws_handler))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading status so nothing published in between is missed
    let mut rx = state.responses_tx.subscribe();

    info!("WebSocket client connected");

    match StatusResponse::collect(&state).await {
        Ok(status) => match serde_json::to_string(&status) {
            Ok(json) => {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    info!("WebSocket client disconnected during initial status");
                    return;
                }
            }
            Err(e) => warn!("Failed to serialize status: {}", e),
        },
        Err(e) => warn!("Failed to collect status: {:?}", e),
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            let response = match rx.recv().await {
                Ok(response) => response,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagged, {} responses dropped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let json = match serde_json::to_string(&response) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to serialize response: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Incoming messages are only watched for close; pongs are automatic
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_)) => debug!("Received ping"),
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
        },
    }

    info!("WebSocket client disconnected");
}
