//! REST endpoints for driving consultations over HTTP.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ConsultError;

use super::controller::Action;
use super::model::Specialty;
use super::sessions::{SessionHandle, SessionStore};

/// Shared state for consultation routes.
#[derive(Clone)]
pub struct ConsultRouteState {
    pub store: Arc<SessionStore>,
    /// Where `POST .../export` saves reports. `None` disables saving.
    pub export_dir: Option<PathBuf>,
}

/// Build the consultation REST routes.
pub fn consult_routes(state: ConsultRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/consult/specialties", get(list_specialties))
        .route("/api/consult/sessions", post(create_session))
        .route(
            "/api/consult/sessions/{id}",
            get(get_session).delete(delete_session),
        )
        .route("/api/consult/sessions/{id}/actions", post(apply_action))
        .route(
            "/api/consult/sessions/{id}/export",
            get(download_export).post(save_export),
        )
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "ai-hospital"
    }))
}

/// GET /api/consult/specialties
async fn list_specialties() -> impl IntoResponse {
    let menu: Vec<serde_json::Value> = Specialty::MENU
        .iter()
        .map(|s| {
            serde_json::json!({
                "specialty": s,
                "title": s.title(),
                "requires_profile": s.requires_profile(),
            })
        })
        .collect();
    Json(menu)
}

fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({"error": message.into()}))).into_response()
}

/// Parse the path id and look the session up.
async fn lookup(state: &ConsultRouteState, id: &str) -> Result<(Uuid, SessionHandle), Response> {
    let session_id = Uuid::parse_str(id)
        .map_err(|_| error_json(StatusCode::BAD_REQUEST, "Invalid session ID"))?;
    let handle = state
        .store
        .get(session_id)
        .await
        .ok_or_else(|| error_json(StatusCode::NOT_FOUND, "Session not found"))?;
    Ok((session_id, handle))
}

/// POST /api/consult/sessions
async fn create_session(State(state): State<ConsultRouteState>) -> impl IntoResponse {
    let (id, handle) = state.store.create().await;
    let view = handle.lock().await.view();
    (
        StatusCode::CREATED,
        Json(serde_json::json!({"session_id": id, "view": view})),
    )
}

/// GET /api/consult/sessions/{id}
///
/// A re-render: runs the current phase's entry step, which is a no-op once
/// the phase has what it needs.
async fn get_session(State(state): State<ConsultRouteState>, Path(id): Path<String>) -> Response {
    let (_, handle) = match lookup(&state, &id).await {
        Ok(found) => found,
        Err(resp) => return resp,
    };
    let view = handle.lock().await.refresh().await;
    Json(view).into_response()
}

/// DELETE /api/consult/sessions/{id}
async fn delete_session(
    State(state): State<ConsultRouteState>,
    Path(id): Path<String>,
) -> Response {
    let (session_id, _) = match lookup(&state, &id).await {
        Ok(found) => found,
        Err(resp) => return resp,
    };
    state.store.remove(session_id).await;
    StatusCode::NO_CONTENT.into_response()
}

fn consult_error_status(error: &ConsultError) -> (StatusCode, &'static str) {
    match error {
        ConsultError::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
        ConsultError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
        ConsultError::StaleAnswer { .. } => (StatusCode::CONFLICT, "stale_answer"),
        ConsultError::NoPendingQuestion => (StatusCode::CONFLICT, "no_pending_question"),
    }
}

/// POST /api/consult/sessions/{id}/actions
///
/// A body that is not a known action gets 400 with the same
/// `{error, kind}` shape as a rejected action.
async fn apply_action(
    State(state): State<ConsultRouteState>,
    Path(id): Path<String>,
    payload: Result<Json<Action>, JsonRejection>,
) -> Response {
    let (session_id, handle) = match lookup(&state, &id).await {
        Ok(found) => found,
        Err(resp) => return resp,
    };
    let action = match payload {
        Ok(Json(action)) => action,
        Err(rejection) => {
            debug!(session_id = %session_id, error = %rejection, "Malformed action body");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": rejection.body_text(),
                    "kind": "bad_request",
                })),
            )
                .into_response();
        }
    };

    let name = action.name();
    let result = handle.lock().await.dispatch(action).await;
    match result {
        Ok(view) => Json(view).into_response(),
        Err(e) => {
            let (status, kind) = consult_error_status(&e);
            info!(session_id = %session_id, action = name, error = %e, "Action rejected");
            (
                status,
                Json(serde_json::json!({"error": e.to_string(), "kind": kind})),
            )
                .into_response()
        }
    }
}

/// GET /api/consult/sessions/{id}/export
///
/// The plain-text report as an attachment.
async fn download_export(
    State(state): State<ConsultRouteState>,
    Path(id): Path<String>,
) -> Response {
    let (_, handle) = match lookup(&state, &id).await {
        Ok(found) => found,
        Err(resp) => return resp,
    };
    let export = match handle.lock().await.export(chrono::Local::now().naive_local()) {
        Ok(export) => export,
        Err(e) => return error_json(StatusCode::NOT_FOUND, e.to_string()),
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.filename),
            ),
        ],
        export.contents,
    )
        .into_response()
}

/// POST /api/consult/sessions/{id}/export
///
/// Save the plain-text report into the configured export directory.
async fn save_export(State(state): State<ConsultRouteState>, Path(id): Path<String>) -> Response {
    let Some(dir) = state.export_dir.clone() else {
        return error_json(StatusCode::NOT_FOUND, "Report export is disabled");
    };
    let (session_id, handle) = match lookup(&state, &id).await {
        Ok(found) => found,
        Err(resp) => return resp,
    };
    let export = match handle.lock().await.export(chrono::Local::now().naive_local()) {
        Ok(export) => export,
        Err(e) => return error_json(StatusCode::NOT_FOUND, e.to_string()),
    };

    match export.write_to(&dir).await {
        Ok(path) => {
            info!(session_id = %session_id, path = %path.display(), "Report exported");
            (
                StatusCode::CREATED,
                Json(serde_json::json!({"filename": export.filename, "path": path})),
            )
                .into_response()
        }
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Report export failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
