//! Downstream credential minting and decoding (HS256 with the shared
//! downstream secret).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use orgplane_core::models::token::{TokenPair, TokenSubject};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "ACCESS",
            TokenType::Refresh => "REFRESH",
        }
    }
}

/// JWT claims the downstream application reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamClaims {
    /// Subject: the downstream user id on access tokens, the global user id
    /// on refresh tokens.
    pub sub: String,
    pub user_id: String,
    /// Access tokens only. Refresh re-resolves the tenant from the user's
    /// current linkage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_workspace_id: Option<String>,
    pub auth_provider: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Only set on refresh tokens: the type they may be exchanged for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeted_token_type: Option<TokenType>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl DownstreamClaims {
    pub fn user_uuid(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.user_id)
            .map_err(|e| AuthError::TokenInvalid(format!("userId is not a UUID: {e}")))
    }
}

fn encoding_key(config: &AuthConfig) -> Result<EncodingKey, AuthError> {
    if config.downstream_jwt_secret.is_empty() {
        return Err(AuthError::Crypto("downstream JWT secret is not configured".into()));
    }
    Ok(EncodingKey::from_secret(
        config.downstream_jwt_secret.as_bytes(),
    ))
}

fn sign(claims: &DownstreamClaims, config: &AuthConfig) -> Result<String, AuthError> {
    let key = encoding_key(config)?;
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &key)
        .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))
}

fn expiry(now: DateTime<Utc>, lifetime_secs: u64) -> DateTime<Utc> {
    now + Duration::seconds(lifetime_secs as i64)
}

/// Issue an access token scoped to one tenant workspace.
pub fn issue_access_token(
    subject: &TokenSubject,
    config: &AuthConfig,
) -> Result<(String, DateTime<Utc>), AuthError> {
    let now = Utc::now();
    let exp = expiry(now, config.access_token_lifetime_secs);
    let claims = DownstreamClaims {
        sub: subject.user_id.to_string(),
        user_id: subject.user_id.to_string(),
        tenant_id: Some(subject.tenant_id.to_string()),
        workspace_id: Some(subject.workspace_id.to_string()),
        user_workspace_id: Some(subject.user_workspace_id.to_string()),
        auth_provider: config.auth_provider.clone(),
        token_type: TokenType::Access,
        targeted_token_type: None,
        iat: now.timestamp(),
        exp: exp.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };
    Ok((sign(&claims, config)?, exp))
}

/// Issue a refresh token that can only be traded for a new access token.
/// It names the global user and nothing else.
pub fn issue_refresh_token(
    user_id: Uuid,
    config: &AuthConfig,
) -> Result<(String, DateTime<Utc>), AuthError> {
    let now = Utc::now();
    let exp = expiry(now, config.refresh_token_lifetime_secs);
    let claims = DownstreamClaims {
        sub: user_id.to_string(),
        user_id: user_id.to_string(),
        tenant_id: None,
        workspace_id: None,
        user_workspace_id: None,
        auth_provider: config.auth_provider.clone(),
        token_type: TokenType::Refresh,
        targeted_token_type: Some(TokenType::Access),
        iat: now.timestamp(),
        exp: exp.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };
    Ok((sign(&claims, config)?, exp))
}

/// Mint an access token for `subject` and a refresh token for the global
/// user `global_user_id`.
pub fn issue_token_pair(
    subject: &TokenSubject,
    global_user_id: Uuid,
    config: &AuthConfig,
) -> Result<TokenPair, AuthError> {
    let (access_token, access_expires_at) = issue_access_token(subject, config)?;
    let (refresh_token, refresh_expires_at) = issue_refresh_token(global_user_id, config)?;
    Ok(TokenPair {
        access_token,
        refresh_token,
        access_expires_at,
        refresh_expires_at,
    })
}

fn decode(token: &str, config: &AuthConfig) -> Result<DownstreamClaims, AuthError> {
    if config.downstream_jwt_secret.is_empty() {
        return Err(AuthError::Crypto("downstream JWT secret is not configured".into()));
    }
    let key = DecodingKey::from_secret(config.downstream_jwt_secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["sub", "exp", "iat"]);

    jsonwebtoken::decode::<DownstreamClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid(e.to_string()),
        })
}

/// Decode an access token. Refresh tokens are rejected.
pub fn decode_access_token(token: &str, config: &AuthConfig) -> Result<DownstreamClaims, AuthError> {
    let claims = decode(token, config)?;
    if claims.token_type != TokenType::Access {
        return Err(AuthError::WrongTokenType {
            expected: TokenType::Access.as_str(),
            found: claims.token_type.as_str().into(),
        });
    }
    Ok(claims)
}

/// Decode a refresh token targeted at access tokens.
pub fn decode_refresh_token(
    token: &str,
    config: &AuthConfig,
) -> Result<DownstreamClaims, AuthError> {
    let claims = decode(token, config)?;
    if claims.token_type != TokenType::Refresh {
        return Err(AuthError::WrongTokenType {
            expected: TokenType::Refresh.as_str(),
            found: claims.token_type.as_str().into(),
        });
    }
    if claims.targeted_token_type != Some(TokenType::Access) {
        return Err(AuthError::TokenInvalid(
            "refresh token is not targeted at access tokens".into(),
        ));
    }
    Ok(claims)
}

/// Short, non-reversible identifier for a credential, safe to log.
pub fn fingerprint(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(&digest[..8])
}
