//! Authentication configuration.

use jsonwebtoken::Algorithm;

/// Configuration for credential verification, token minting and webhook
/// signatures.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Shared HS256 secret the downstream application verifies tokens with.
    pub downstream_jwt_secret: String,
    /// Access token lifetime in seconds (default: 86_400 = 24 hours).
    pub access_token_lifetime_secs: u64,
    /// Refresh token lifetime in seconds (default: 2_592_000 = 30 days).
    pub refresh_token_lifetime_secs: u64,
    /// Value of the `authProvider` claim in minted tokens.
    pub auth_provider: String,
    /// PEM public key of the identity provider. `None` disables the
    /// provider JWT verifier.
    pub provider_public_key_pem: Option<String>,
    /// Signing algorithm of the provider key (RS256 or EdDSA).
    pub provider_algorithm: Algorithm,
    /// HS256 secret for self-issued foreign JWTs. `None` disables the
    /// shared-secret verifier.
    pub fallback_jwt_secret: Option<String>,
    /// Base URL of the provider's session API (e.g., `https://api.clerk.com`).
    pub session_api_url: Option<String>,
    /// Bearer secret for the session API.
    pub session_api_key: Option<String>,
    /// Prefixes identifying opaque provider session tokens.
    pub session_token_prefixes: Vec<String>,
    /// Webhook signing secret, optionally `whsec_`-prefixed base64.
    pub webhook_secret: String,
    /// Maximum clock skew accepted on webhook timestamps, in seconds.
    pub webhook_tolerance_secs: u64,
    /// Optional pepper prepended to passwords before Argon2id hashing.
    pub pepper: Option<String>,
    /// Minimum password length for policy enforcement.
    pub min_password_length: usize,
    /// Domain for placeholder emails when a credential carries none.
    pub placeholder_email_domain: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            downstream_jwt_secret: String::new(),
            access_token_lifetime_secs: 86_400,
            refresh_token_lifetime_secs: 2_592_000,
            auth_provider: "clerk".into(),
            provider_public_key_pem: None,
            provider_algorithm: Algorithm::RS256,
            fallback_jwt_secret: None,
            session_api_url: None,
            session_api_key: None,
            session_token_prefixes: vec!["dvb_".into(), "sess_".into()],
            webhook_secret: String::new(),
            webhook_tolerance_secs: 300,
            pepper: None,
            min_password_length: 8,
            placeholder_email_domain: "users.orgplane.invalid".into(),
        }
    }
}

impl AuthConfig {
    /// Email used for identities whose credential carries none.
    pub fn placeholder_email(&self, subject: &str) -> String {
        format!("user-{subject}@{}", self.placeholder_email_domain)
    }
}
