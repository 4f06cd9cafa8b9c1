use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orgplane_engine::{RegistrationInput, RegistrationOutcome, RegistrationStatus};
use serde_json::{Value, json};

use super::error::ApiError;
use crate::state::AppState;

/// `POST /api/auth/register-organization`
pub async fn register_organization(
    State(state): State<AppState>,
    Json(input): Json<RegistrationInput>,
) -> Result<Response, ApiError> {
    let response = match state.registration.register(input).await? {
        RegistrationOutcome::Completed { result, cached } => {
            let mut body = json!({ "success": true, "cached": cached });
            merge(&mut body, result);
            (StatusCode::CREATED, Json(body)).into_response()
        }
        RegistrationOutcome::Processing { key } => (
            StatusCode::ACCEPTED,
            Json(json!({
                "success": true,
                "status": "processing",
                "idempotency_key": key,
                "status_url": format!("/api/auth/registration-status/{key}"),
            })),
        )
            .into_response(),
    };
    Ok(response)
}

/// `GET /api/auth/registration-status/:key`
pub async fn registration_status(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let body = match state.registration.status(&key).await? {
        RegistrationStatus::Processing => json!({ "status": "processing" }),
        RegistrationStatus::Completed(result) => json!({ "status": "completed", "result": result }),
        RegistrationStatus::Failed(error) => json!({ "status": "failed", "error": error }),
    };
    Ok(Json(body))
}

fn merge(body: &mut Value, result: Value) {
    if let (Some(target), Value::Object(fields)) = (body.as_object_mut(), result) {
        target.extend(fields);
    }
}
