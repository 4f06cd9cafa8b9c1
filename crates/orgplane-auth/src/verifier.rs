//! Foreign credential verification.
//!
//! A [`VerifierChain`] tries each [`CredentialVerifier`] in order. A
//! verifier that does not recognize the credential's shape answers
//! `NotApplicable` and the next one is tried; a verifier that recognizes
//! it but refuses it stops the chain.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use orgplane_core::models::token::ForeignIdentity;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::token::fingerprint;

#[derive(Debug)]
pub enum VerifierOutcome {
    Verified(ForeignIdentity),
    NotApplicable,
    Rejected(AuthError),
}

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn verify(&self, credential: &str) -> VerifierOutcome;
}

fn jwt_error(e: jsonwebtoken::errors::Error) -> AuthError {
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenInvalid(e.to_string()),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Provider-signed JWTs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProviderClaims {
    sub: String,
    #[serde(default)]
    org_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    org_role: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

/// Session JWTs signed with the identity provider's asymmetric key.
pub struct ProviderJwtVerifier {
    key: DecodingKey,
    algorithm: Algorithm,
}

impl ProviderJwtVerifier {
    pub fn from_pem(pem: &str, algorithm: Algorithm) -> Result<Self, AuthError> {
        let key = match algorithm {
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
                DecodingKey::from_rsa_pem(pem.as_bytes())
            }
            Algorithm::EdDSA => DecodingKey::from_ed_pem(pem.as_bytes()),
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem.as_bytes()),
            other => {
                return Err(AuthError::Crypto(format!(
                    "unsupported provider algorithm {other:?}"
                )));
            }
        }
        .map_err(|e| AuthError::Crypto(format!("bad provider public key: {e}")))?;
        Ok(Self { key, algorithm })
    }
}

#[async_trait]
impl CredentialVerifier for ProviderJwtVerifier {
    fn name(&self) -> &'static str {
        "provider_jwt"
    }

    async fn verify(&self, credential: &str) -> VerifierOutcome {
        match jsonwebtoken::decode_header(credential) {
            Ok(header) if header.alg == self.algorithm => {}
            _ => return VerifierOutcome::NotApplicable,
        }

        let mut validation = Validation::new(self.algorithm);
        validation.set_required_spec_claims(&["sub", "exp"]);
        validation.validate_aud = false;

        match jsonwebtoken::decode::<ProviderClaims>(credential, &self.key, &validation) {
            Ok(data) => {
                let claims = data.claims;
                VerifierOutcome::Verified(ForeignIdentity {
                    subject: claims.sub,
                    org_id: non_empty(claims.org_id),
                    email: non_empty(claims.email),
                    org_role: claims.org_role,
                    first_name: claims.first_name,
                    last_name: claims.last_name,
                    verified_by: self.name().into(),
                })
            }
            Err(e) => VerifierOutcome::Rejected(jwt_error(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared-secret JWTs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SharedSecretClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default, rename = "userId")]
    user_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    org_id: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

/// HS256 JWTs issued by a trusted first party with a shared secret.
pub struct SharedSecretJwtVerifier {
    key: DecodingKey,
}

impl SharedSecretJwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl CredentialVerifier for SharedSecretJwtVerifier {
    fn name(&self) -> &'static str {
        "shared_secret_jwt"
    }

    async fn verify(&self, credential: &str) -> VerifierOutcome {
        match jsonwebtoken::decode_header(credential) {
            Ok(header) if header.alg == Algorithm::HS256 => {}
            _ => return VerifierOutcome::NotApplicable,
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        validation.validate_aud = false;

        let claims = match jsonwebtoken::decode::<SharedSecretClaims>(
            credential,
            &self.key,
            &validation,
        ) {
            Ok(data) => data.claims,
            Err(e) => return VerifierOutcome::Rejected(jwt_error(e)),
        };

        let Some(subject) = non_empty(claims.sub).or(non_empty(claims.user_id)) else {
            return VerifierOutcome::Rejected(AuthError::TokenInvalid(
                "token carries no subject".into(),
            ));
        };

        VerifierOutcome::Verified(ForeignIdentity {
            subject,
            org_id: non_empty(claims.tenant_id).or(non_empty(claims.org_id)),
            email: non_empty(claims.email),
            org_role: claims.role,
            first_name: None,
            last_name: None,
            verified_by: self.name().into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Opaque provider sessions
// ---------------------------------------------------------------------------

/// Session resolved through the provider's session API.
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    pub user_id: String,
    pub org_id: Option<String>,
    pub email: Option<String>,
}

/// Resolves opaque session tokens. `Ok(None)` means the provider does not
/// know the token.
#[async_trait]
pub trait SessionLookup: Send + Sync {
    async fn lookup(&self, token: &str) -> Result<Option<SessionInfo>, AuthError>;
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(default, alias = "userId")]
    user_id: Option<String>,
    #[serde(default, alias = "organizationId")]
    org_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// [`SessionLookup`] over `GET {base_url}/v1/sessions/{token}`.
pub struct HttpSessionLookup {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpSessionLookup {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl SessionLookup for HttpSessionLookup {
    async fn lookup(&self, token: &str) -> Result<Option<SessionInfo>, AuthError> {
        let url = format!("{}/v1/sessions/{token}", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::UNAUTHORIZED => Ok(None),
            status if !status.is_success() => Err(AuthError::Unavailable(format!(
                "session API answered {status}"
            ))),
            _ => {
                let body: SessionResponse = response
                    .json()
                    .await
                    .map_err(|e| AuthError::Unavailable(format!("session API body: {e}")))?;
                Ok(non_empty(body.user_id).map(|user_id| SessionInfo {
                    user_id,
                    org_id: non_empty(body.org_id),
                    email: non_empty(body.email),
                }))
            }
        }
    }
}

/// Opaque, prefix-identified session tokens.
pub struct SessionTokenVerifier<L: SessionLookup> {
    lookup: L,
    prefixes: Vec<String>,
}

impl<L: SessionLookup> SessionTokenVerifier<L> {
    pub fn new(lookup: L, prefixes: Vec<String>) -> Self {
        Self { lookup, prefixes }
    }
}

fn is_opaque_token(credential: &str) -> bool {
    credential
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[async_trait]
impl<L: SessionLookup> CredentialVerifier for SessionTokenVerifier<L> {
    fn name(&self) -> &'static str {
        "provider_session"
    }

    async fn verify(&self, credential: &str) -> VerifierOutcome {
        if !self.prefixes.iter().any(|p| credential.starts_with(p.as_str())) {
            return VerifierOutcome::NotApplicable;
        }
        if !is_opaque_token(credential) {
            return VerifierOutcome::Rejected(AuthError::TokenInvalid(
                "malformed session token".into(),
            ));
        }

        match self.lookup.lookup(credential).await {
            Ok(Some(session)) => VerifierOutcome::Verified(ForeignIdentity {
                subject: session.user_id,
                org_id: session.org_id,
                email: session.email,
                org_role: None,
                first_name: None,
                last_name: None,
                verified_by: self.name().into(),
            }),
            Ok(None) => VerifierOutcome::Rejected(AuthError::InvalidCredentials),
            Err(e) => {
                warn!(token = %fingerprint(credential), error = %e, "Session lookup failed");
                VerifierOutcome::Rejected(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Ordered list of verifiers; the first applicable one decides.
#[derive(Default)]
pub struct VerifierChain {
    verifiers: Vec<Box<dyn CredentialVerifier>>,
}

impl VerifierChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, verifier: impl CredentialVerifier + 'static) -> Self {
        self.verifiers.push(Box::new(verifier));
        self
    }

    /// Default order: provider JWT key, shared-secret JWT, session lookup.
    /// Strategies without configuration are left out.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let mut chain = Self::new();
        if let Some(pem) = &config.provider_public_key_pem {
            chain = chain.with(ProviderJwtVerifier::from_pem(pem, config.provider_algorithm)?);
        }
        if let Some(secret) = config.fallback_jwt_secret.as_deref().filter(|s| !s.is_empty()) {
            chain = chain.with(SharedSecretJwtVerifier::new(secret));
        }
        if let (Some(url), Some(key)) = (&config.session_api_url, &config.session_api_key) {
            chain = chain.with(SessionTokenVerifier::new(
                HttpSessionLookup::new(url.clone(), key.clone()),
                config.session_token_prefixes.clone(),
            ));
        }
        Ok(chain)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.verifiers.iter().map(|v| v.name()).collect()
    }

    pub async fn verify(&self, credential: &str) -> Result<ForeignIdentity, AuthError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        for verifier in &self.verifiers {
            match verifier.verify(credential).await {
                VerifierOutcome::Verified(identity) => {
                    debug!(
                        verifier = verifier.name(),
                        subject = %identity.subject,
                        "Foreign credential verified"
                    );
                    return Ok(identity);
                }
                VerifierOutcome::Rejected(e) => {
                    debug!(verifier = verifier.name(), error = %e, "Foreign credential rejected");
                    return Err(e);
                }
                VerifierOutcome::NotApplicable => continue,
            }
        }
        Err(AuthError::InvalidCredentials)
    }
}
