//! HTTP surface.

pub mod error;
pub mod registration;
pub mod tokens;
pub mod webhooks;

use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::routing::{get, post};
use serde_json::{Value, json};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/auth/register-organization",
            post(registration::register_organization),
        )
        .route(
            "/api/auth/registration-status/:key",
            get(registration::registration_status),
        )
        .route("/api/auth/token", post(tokens::exchange))
        .route("/api/auth/verify", get(tokens::verify))
        .route("/api/auth/refresh", post(tokens::refresh))
        .route("/api/webhooks/identity", post(webhooks::identity_webhook))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
