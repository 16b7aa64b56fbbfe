//! HTTP endpoints for the reporting dashboard.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::error;

use super::Reporter;
use crate::error::DatabaseError;

/// Build the reporting router.
pub fn reporting_routes(reporter: Reporter) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stats", get(stats))
        .route("/api/users", get(users))
        .route("/api/requests", get(requests))
        .route("/api/sessions", get(sessions))
        .layer(CorsLayer::permissive())
        .with_state(reporter)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "consult-desk"
    }))
}

/// Serialize `result`, or answer 500 with a short message.
fn respond<T: Serialize>(result: Result<T, DatabaseError>, failure: &str) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            error!("{failure}: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "message": failure })),
            )
                .into_response()
        }
    }
}

async fn stats(State(reporter): State<Reporter>) -> Response {
    respond(reporter.summary().await, "Failed to fetch stats")
}

async fn users(State(reporter): State<Reporter>) -> Response {
    respond(reporter.accounts().await, "Failed to fetch users")
}

async fn requests(State(reporter): State<Reporter>) -> Response {
    respond(reporter.requests().await, "Failed to fetch requests")
}

async fn sessions(State(reporter): State<Reporter>) -> Response {
    respond(reporter.sessions().await, "Failed to fetch sessions")
}
