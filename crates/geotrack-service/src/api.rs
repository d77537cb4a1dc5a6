//! REST API endpoints for the geotrack-service.
//!
//! Requests to the controller are queued and answered asynchronously: `POST
//! /api/actions` returns `202 Accepted` once the request is queued, and the
//! controller's responses arrive on the WebSocket stream (`/api/ws`).
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]. Store errors are
//! converted automatically and return HTTP 500.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use geotrack_store::{SampleQuery, SessionSummary};
use geotrack_types::{Action, ActionMessage, Request, Sample, Session, SessionDisplay};

use crate::controller::ServiceState;
use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/actions", post(post_action))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/samples", get(get_samples))
        .route("/api/sessions/{id}/export.csv", get(export_csv))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Controller status, as sent by `GET /api/status` and first on every WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub service: ServiceState,
    /// Whether the controller task still accepts requests.
    pub running: bool,
    pub operating: bool,
    pub current_session_id: Option<i64>,
    pub last_action: Action,
    /// Name of the position source.
    pub source: String,
    pub display: SessionDisplay,
}

impl StatusResponse {
    /// Gather status from the controller handle and the persisted display keys.
    pub async fn collect(state: &AppState) -> Result<Self, AppError> {
        let status = state.controller.status();
        let display = state.store.lock().await.load_display()?;
        Ok(Self {
            service: status.service,
            running: state.controller.is_running(),
            operating: status.snapshot.operating,
            current_session_id: status.snapshot.current_session_id,
            last_action: status.snapshot.last_action,
            source: state.source_name.clone(),
            display,
        })
    }
}

async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, AppError> {
    Ok(Json(StatusResponse::collect(&state).await?))
}

/// Acknowledgement for a queued action.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionAccepted {
    /// The action the request was filed under.
    pub action: Action,
    pub queued: bool,
}

/// Queue an action for the controller.
///
/// Unknown action names are queued too; the controller answers them with
/// `UnknownAction`.
async fn post_action(
    State(state): State<Arc<AppState>>,
    Json(message): Json<ActionMessage>,
) -> Result<(StatusCode, Json<ActionAccepted>), AppError> {
    let request = Request::from_message(&message);
    let action = request.action();
    debug!(action = %action, "Queueing request");

    state
        .controller
        .send(request)
        .await
        .map_err(|e| AppError::Unavailable(e.to_string()))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ActionAccepted {
            action,
            queued: true,
        }),
    ))
}

/// Query parameters for listing sessions.
#[derive(Debug, Default, Deserialize)]
pub struct SessionsQuery {
    pub limit: Option<u32>,
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SessionsQuery>,
) -> Result<Json<Vec<Session>>, AppError> {
    let store = state.store.lock().await;
    Ok(Json(store.list_sessions(params.limit)?))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SessionSummary>, AppError> {
    let store = state.store.lock().await;
    store
        .session_summary(id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", id)))
}

/// Query parameters for samples.
#[derive(Debug, Default, Deserialize)]
pub struct SamplesQuery {
    /// Unix timestamp, inclusive.
    pub since: Option<i64>,
    /// Unix timestamp, inclusive.
    pub until: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// `asc` for chronological order. Newest first otherwise.
    pub order: Option<String>,
}

impl SamplesQuery {
    /// Returns an error if `since > until` or the order is not recognized.
    pub fn validate(&self) -> Result<(), AppError> {
        if let (Some(since), Some(until)) = (self.since, self.until)
            && since > until
        {
            return Err(AppError::BadRequest(format!(
                "Invalid time range: 'since' ({}) must be less than or equal to 'until' ({})",
                since, until
            )));
        }
        if let Some(order) = &self.order
            && order != "asc"
            && order != "desc"
        {
            return Err(AppError::BadRequest(format!(
                "Invalid order '{}': expected 'asc' or 'desc'",
                order
            )));
        }
        Ok(())
    }
}

/// Paginated response wrapper with metadata.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata.
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    /// Number of items returned.
    pub count: usize,
    /// Offset from the beginning.
    pub offset: u32,
    /// Maximum items requested (if specified).
    pub limit: Option<u32>,
    /// Whether there are more items available.
    pub has_more: bool,
}

/// Samples of one session, paginated.
///
/// # Query Parameters
///
/// - `since` / `until`: Unix timestamps (inclusive)
/// - `limit` / `offset`: pagination
/// - `order`: `asc` or `desc` (default)
async fn get_samples(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<SamplesQuery>,
) -> Result<Json<PaginatedResponse<Sample>>, AppError> {
    params.validate()?;

    let mut query = SampleQuery::new().session(id);
    if let Some(since) = params.since
        && let Ok(dt) = OffsetDateTime::from_unix_timestamp(since)
    {
        query = query.since(dt);
    }
    if let Some(until) = params.until
        && let Ok(dt) = OffsetDateTime::from_unix_timestamp(until)
    {
        query = query.until(dt);
    }
    if params.order.as_deref() == Some("asc") {
        query = query.oldest_first();
    }
    // One extra item tells whether there are more
    if let Some(limit) = params.limit {
        query = query.limit(limit.saturating_add(1));
    }
    if let Some(offset) = params.offset {
        query = query.offset(offset);
    }

    let store = state.store.lock().await;
    if store.get_session(id)?.is_none() {
        return Err(AppError::NotFound(format!("Session not found: {}", id)));
    }
    let mut samples = store.query_samples(&query)?;

    let has_more = params.limit.is_some_and(|l| samples.len() > l as usize);
    if has_more {
        samples.pop();
    }

    Ok(Json(PaginatedResponse {
        pagination: PaginationMeta {
            count: samples.len(),
            offset: params.offset.unwrap_or(0),
            limit: params.limit,
            has_more,
        },
        data: samples,
    }))
}

/// A session's samples as CSV, oldest first.
async fn export_csv(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let store = state.store.lock().await;
    if store.get_session(id)?.is_none() {
        return Err(AppError::NotFound(format!("Session not found: {}", id)));
    }

    let mut body = Vec::new();
    store.export_samples_csv(id, &mut body)?;

    let disposition = format!("attachment; filename=\"session-{id}.csv\"");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

/// API errors.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    /// The controller is not accepting requests.
    Unavailable(String),
    Store(geotrack_store::Error),
}

impl From<geotrack_store::Error> for AppError {
    fn from(e: geotrack_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest};
    use geotrack_core::MockPositionSource;
    use geotrack_store::Store;
    use geotrack_types::Position;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::Config;

    async fn create_test_state() -> Arc<AppState> {
        create_test_state_with(Store::open_in_memory().unwrap()).await
    }

    async fn create_test_state_with(store: Store) -> Arc<AppState> {
        let (state, _task) =
            AppState::start(store, Arc::new(MockPositionSource::new()), Config::default()).await;
        state
    }

    async fn response_body(response: axum::response::Response) -> String {
        let body = response.into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn get(state: Arc<AppState>, uri: &str) -> axum::response::Response {
        router()
            .with_state(state)
            .oneshot(HttpRequest::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        let session = store.create_session("road-1").unwrap();
        for i in 0..3 {
            let at = OffsetDateTime::from_unix_timestamp(1_700_000_000 + i).unwrap();
            store
                .append_sample(
                    session.id,
                    &Position::new(1.0 + i as f64, 2.0).with_captured_at(at),
                )
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = get(create_test_state().await, "/api/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&response_body(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_status_endpoint_defaults() {
        let response = get(create_test_state().await, "/api/status").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&response_body(response).await).unwrap();
        assert_eq!(json["service"], "not_started");
        assert_eq!(json["operating"], false);
        assert_eq!(json["source"], "mock");
        assert_eq!(json["display"]["name"], "Unnamed");
        assert_eq!(json["display"]["started_at"], "-");
    }

    #[tokio::test]
    async fn test_post_action_is_accepted() {
        let state = create_test_state().await;
        let mut rx = state.responses_tx.subscribe();

        let response = router()
            .with_state(Arc::clone(&state))
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/api/actions")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"action":"start_controller"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let json: serde_json::Value = serde_json::from_str(&response_body(response).await).unwrap();
        assert_eq!(json["action"], "start_controller");
        assert_eq!(json["queued"], true);

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.action, Action::StartController);
    }

    #[tokio::test]
    async fn test_post_unknown_action_is_queued() {
        let state = create_test_state().await;
        let response = router()
            .with_state(state)
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/api/actions")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"action":"launch_rocket"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let json: serde_json::Value = serde_json::from_str(&response_body(response).await).unwrap();
        assert_eq!(json["action"], "unknown");
    }

    #[tokio::test]
    async fn test_list_and_get_sessions() {
        let state = create_test_state_with(seeded_store()).await;

        let response = get(Arc::clone(&state), "/api/sessions").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&response_body(response).await).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["name"], "road-1");

        let response = get(Arc::clone(&state), "/api/sessions/1").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&response_body(response).await).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["sample_count"], 3);

        let response = get(state, "/api/sessions/99").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json: serde_json::Value = serde_json::from_str(&response_body(response).await).unwrap();
        assert!(json["error"].as_str().unwrap().contains("99"));
    }

    #[tokio::test]
    async fn test_samples_pagination() {
        let state = create_test_state_with(seeded_store()).await;

        let response = get(state, "/api/sessions/1/samples?limit=2&order=asc").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&response_body(response).await).unwrap();
        assert_eq!(json["pagination"]["count"], 2);
        assert_eq!(json["pagination"]["has_more"], true);
        assert_eq!(json["data"][0]["latitude"], 1.0);
    }

    #[tokio::test]
    async fn test_samples_invalid_query() {
        let state = create_test_state_with(seeded_store()).await;

        let response = get(Arc::clone(&state), "/api/sessions/1/samples?since=10&until=5").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = get(Arc::clone(&state), "/api/sessions/1/samples?order=sideways").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = get(state, "/api/sessions/5/samples").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_export_csv() {
        let state = create_test_state_with(seeded_store()).await;

        let response = get(Arc::clone(&state), "/api/sessions/1/export.csv").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        let body = response_body(response).await;
        assert_eq!(body.lines().count(), 4);
        assert!(body.starts_with("session_id,latitude,longitude,captured_at"));

        let response = get(state, "/api/sessions/2/export.csv").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_samples_query_validate() {
        let ok = SamplesQuery {
            since: Some(1),
            until: Some(2),
            order: Some("desc".into()),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let reversed = SamplesQuery {
            since: Some(3),
            until: Some(2),
            ..Default::default()
        };
        assert!(matches!(reversed.validate(), Err(AppError::BadRequest(_))));
    }
}
