//! HTTP mapping for [`PlaneError`].
//!
//! Bodies are always `{ "error": <kind>, "message": <text> }`. Storage and
//! internal failures are logged in full and returned with a generic message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orgplane_core::error::PlaneError;
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub struct ApiError(pub PlaneError);

impl From<PlaneError> for ApiError {
    fn from(err: PlaneError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &PlaneError) -> StatusCode {
    match err {
        PlaneError::Validation { .. } | PlaneError::InvalidSignature { .. } => {
            StatusCode::BAD_REQUEST
        }
        PlaneError::NotFound { .. } => StatusCode::NOT_FOUND,
        PlaneError::AlreadyExists { .. }
        | PlaneError::DuplicateTenant { .. }
        | PlaneError::ConflictingLink { .. }
        | PlaneError::InvalidTransition { .. } => StatusCode::CONFLICT,
        PlaneError::AuthenticationFailed { .. }
        | PlaneError::MissingOrganization
        | PlaneError::TenantNotProvisioned { .. }
        | PlaneError::LinkageFailure { .. } => StatusCode::UNAUTHORIZED,
        PlaneError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
        PlaneError::SlugExhausted { .. }
        | PlaneError::Provisioning { .. }
        | PlaneError::Crypto(_)
        | PlaneError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = status_for(&err);
        let message = match &err {
            PlaneError::Database(_) => {
                error!(error = %err, "Storage failure");
                "storage is temporarily unavailable".to_string()
            }
            PlaneError::Crypto(_) | PlaneError::Internal(_) => {
                error!(error = %err, "Internal failure");
                "internal error".to_string()
            }
            // Provisioning reasons can carry downstream driver text.
            PlaneError::Provisioning { tenant_id, .. } => {
                error!(error = %err, "Provisioning failure");
                format!("provisioning failed for tenant {tenant_id}")
            }
            _ => err.to_string(),
        };
        (status, Json(json!({ "error": err.kind(), "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_family_is_unauthorized() {
        for err in [
            PlaneError::MissingOrganization,
            PlaneError::TenantNotProvisioned {
                org_id: "org_1".into(),
            },
            PlaneError::LinkageFailure {
                reason: "no workspace".into(),
            },
        ] {
            assert_eq!(status_for(&err), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn storage_outage_is_unavailable() {
        assert_eq!(
            status_for(&PlaneError::Database("reset".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
