use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use orgplane_core::error::PlaneError;
use orgplane_core::models::token::{IdentityInspection, TokenPair};
use serde::Deserialize;

use super::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    pub credential: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// `POST /api/auth/token`
pub async fn exchange(
    State(state): State<AppState>,
    Json(request): Json<ExchangeRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    Ok(Json(state.bridge.exchange(&request.credential).await?))
}

/// `GET /api/auth/verify` with the foreign credential as a bearer token.
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<IdentityInspection>, ApiError> {
    let credential = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PlaneError::AuthenticationFailed {
            reason: "missing bearer credential".into(),
        })?;

    Ok(Json(state.bridge.verify(credential).await?))
}

/// `POST /api/auth/refresh`
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    Ok(Json(state.bridge.refresh(&request.refresh_token).await?))
}
