//! Server configuration sourced from `ORGPLANE_*` environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use jsonwebtoken::Algorithm;
use orgplane_auth::AuthConfig;
use orgplane_db::{DbConfig, TenantStoreConfig};
use orgplane_engine::EngineConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Upper bound for any HTTP request. Must exceed the registration wait.
    pub request_timeout: Duration,
    pub db: DbConfig,
    pub tenant_store: TenantStoreConfig,
    pub auth: AuthConfig,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            request_timeout: Duration::from_secs(60),
            db: DbConfig::default(),
            tenant_store: TenantStoreConfig::default(),
            auth: AuthConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

fn parsed<T>(get_env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_env(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("parse {key}: {e}")),
        None => Ok(None),
    }
}

fn secs(get_env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    Ok(parsed::<u64>(get_env, key)?.map(Duration::from_secs))
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] with a custom variable source.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let text = |key: &str| get_env(key).filter(|v| !v.is_empty());

        if let Some(addr) = text("ORGPLANE_BIND_ADDR") {
            config.bind_addr = addr.parse().with_context(|| "parse ORGPLANE_BIND_ADDR")?;
        }
        if let Some(timeout) = secs(&get_env, "ORGPLANE_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = timeout;
        }

        // Control-plane database
        if let Some(url) = text("ORGPLANE_DB_URL") {
            config.db.url = url;
        }
        if let Some(ns) = text("ORGPLANE_DB_NAMESPACE") {
            config.db.namespace = ns;
        }
        if let Some(db) = text("ORGPLANE_DB_DATABASE") {
            config.db.database = db;
        }
        if let Some(user) = get_env("ORGPLANE_DB_USERNAME") {
            config.db.username = user;
        }
        if let Some(pass) = get_env("ORGPLANE_DB_PASSWORD") {
            config.db.password = pass;
        }

        // Tenant stores
        if let Some(endpoint) = text("ORGPLANE_TENANT_STORE_ENDPOINT") {
            config.tenant_store.endpoint = endpoint;
        }
        if let Some(ns) = text("ORGPLANE_TENANT_STORE_NAMESPACE") {
            config.tenant_store.namespace = ns;
        }
        config.tenant_store.username = config.db.username.clone();
        config.tenant_store.password = config.db.password.clone();

        // Credentials
        let auth = &mut config.auth;
        if let Some(secret) = text("ORGPLANE_JWT_SECRET") {
            auth.downstream_jwt_secret = secret;
        }
        if let Some(secret) = text("ORGPLANE_WEBHOOK_SECRET") {
            auth.webhook_secret = secret;
        }
        if let Some(provider) = text("ORGPLANE_AUTH_PROVIDER") {
            auth.auth_provider = provider;
        }
        auth.provider_public_key_pem = text("ORGPLANE_PROVIDER_PUBLIC_KEY");
        if let Some(alg) = parsed::<Algorithm>(&get_env, "ORGPLANE_PROVIDER_JWT_ALGORITHM")? {
            auth.provider_algorithm = alg;
        }
        auth.fallback_jwt_secret = text("ORGPLANE_FALLBACK_JWT_SECRET");
        auth.session_api_url = text("ORGPLANE_SESSION_API_URL");
        auth.session_api_key = text("ORGPLANE_SESSION_API_KEY");
        auth.pepper = text("ORGPLANE_PASSWORD_PEPPER");
        if let Some(tolerance) = parsed(&get_env, "ORGPLANE_WEBHOOK_TOLERANCE_SECS")? {
            auth.webhook_tolerance_secs = tolerance;
        }
        if let Some(len) = parsed(&get_env, "ORGPLANE_MIN_PASSWORD_LENGTH")? {
            auth.min_password_length = len;
        }

        // Engine
        let engine = &mut config.engine;
        if let Some(timeout) = secs(&get_env, "ORGPLANE_REGISTRATION_TIMEOUT_SECS")? {
            engine.registration_timeout = timeout;
        }
        if let Some(days) = parsed::<u64>(&get_env, "ORGPLANE_LEDGER_RETENTION_DAYS")? {
            let secs = days
                .checked_mul(24 * 3600)
                .ok_or_else(|| anyhow::anyhow!("ORGPLANE_LEDGER_RETENTION_DAYS is out of range"))?;
            engine.ledger_retention = Duration::from_secs(secs);
        }
        if let Some(interval) = secs(&get_env, "ORGPLANE_JANITOR_INTERVAL_SECS")? {
            engine.janitor_interval = interval;
        }
        if let Some(capacity) = parsed(&get_env, "ORGPLANE_QUEUE_CAPACITY")? {
            engine.queue_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.downstream_jwt_secret.is_empty() {
            bail!("ORGPLANE_JWT_SECRET must be set");
        }
        if self.auth.webhook_secret.is_empty() {
            bail!("ORGPLANE_WEBHOOK_SECRET must be set");
        }
        if self.engine.janitor_interval.is_zero() {
            bail!("ORGPLANE_JANITOR_INTERVAL_SECS must be positive");
        }
        // The janitor subtracts the retention window from the current time.
        if chrono::Duration::from_std(self.engine.ledger_retention).is_err() {
            bail!("ORGPLANE_LEDGER_RETENTION_DAYS is out of range");
        }
        if self.request_timeout <= self.engine.registration_timeout {
            bail!(
                "ORGPLANE_REQUEST_TIMEOUT_SECS must exceed ORGPLANE_REGISTRATION_TIMEOUT_SECS"
            );
        }
        Ok(())
    }
}
