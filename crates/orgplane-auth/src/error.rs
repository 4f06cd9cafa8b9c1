//! Authentication error types.

use orgplane_core::error::PlaneError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("token type {found} cannot be used as {expected}")]
    WrongTokenType {
        expected: &'static str,
        found: String,
    },

    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for PlaneError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::TokenExpired
            | AuthError::TokenInvalid(_)
            | AuthError::WrongTokenType { .. }
            | AuthError::Unavailable(_) => PlaneError::AuthenticationFailed {
                reason: err.to_string(),
            },
            AuthError::InvalidSignature(reason) => PlaneError::InvalidSignature { reason },
            AuthError::Crypto(msg) => PlaneError::Crypto(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_errors_are_authentication_failures() {
        let err: PlaneError = AuthError::TokenExpired.into();
        assert_eq!(err.kind(), "authentication_failed");

        let err: PlaneError = AuthError::WrongTokenType {
            expected: "ACCESS",
            found: "REFRESH".into(),
        }
        .into();
        assert_eq!(err.kind(), "authentication_failed");
    }

    #[test]
    fn signature_errors_keep_their_kind() {
        let err: PlaneError = AuthError::InvalidSignature("stale timestamp".into()).into();
        assert_eq!(err.kind(), "invalid_signature");
    }
}
