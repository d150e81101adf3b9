//! Auth front-end: issues, validates and revokes console sessions.

use super::session::SessionError;
use super::ServiceContext;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize, Debug)]
struct CreateSessionBody {
    subject: String,
}

async fn health() -> &'static str {
    "OK"
}

async fn create_session(
    State(ctx): State<ServiceContext>,
    Json(body): Json<CreateSessionBody>,
) -> Response {
    match ctx.sessions.create(&body.subject) {
        Ok(session) => (StatusCode::CREATED, Json(session)).into_response(),
        Err(SessionError::EmptySubject) => {
            (StatusCode::BAD_REQUEST, SessionError::EmptySubject.to_string()).into_response()
        }
        Err(SessionError::Closed) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn get_session(State(ctx): State<ServiceContext>, Path(token): Path<String>) -> Response {
    match ctx.sessions.validate(&token) {
        Some(session) => Json(session).into_response(),
        None => {
            debug!("Rejected unknown or expired session token");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn delete_session(State(ctx): State<ServiceContext>, Path(token): Path<String>) -> StatusCode {
    if ctx.sessions.revoke(&token) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub fn make_router(ctx: ServiceContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/sessions", post(create_session))
        .route("/auth/sessions/{token}", get(get_session).delete(delete_session))
        .with_state(ctx)
}
