use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use orgplane_engine::WebhookEnvelope;
use serde_json::Value;

use super::error::ApiError;
use crate::state::AppState;

/// First non-empty header among `names`.
fn header(headers: &HeaderMap, names: &[&str]) -> String {
    names
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// `POST /api/webhooks/identity`
pub async fn identity_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let envelope = WebhookEnvelope {
        id: header(&headers, &["webhook-id", "svix-id"]),
        timestamp: header(&headers, &["webhook-timestamp", "svix-timestamp"]),
        signature: header(&headers, &["webhook-signature", "svix-signature"]),
        payload: body.to_vec(),
    };

    let delivery = state.webhooks.handle(&envelope).await?;
    Ok(Json(delivery.to_json()))
}
