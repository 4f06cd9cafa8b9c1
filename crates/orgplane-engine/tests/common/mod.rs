//! Shared wiring for engine integration tests: in-memory registry, embedded
//! tenant stores and a real provisioning queue.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use orgplane_auth::signature;
use orgplane_auth::{AuthConfig, VerifierChain};
use orgplane_core::models::tenant::{Tenant, TenantStatus};
use orgplane_core::repository::TenantRepository;
use orgplane_db::repository::{
    SurrealGlobalUserRepository, SurrealIdempotencyRepository, SurrealTenantRepository,
};
use orgplane_db::{SurrealTenantStore, TenantStoreConfig};
use orgplane_engine::webhook::WebhookEnvelope;
use orgplane_engine::{
    ConnectionRouter, EngineConfig, EventHandlers, IdempotencyLedger, Provisioner,
    ProvisioningQueue, RegistrationService, TokenBridge, WebhookRouter,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

pub type Tenants = SurrealTenantRepository<Db>;
pub type Users = SurrealGlobalUserRepository<Db>;
pub type LedgerStore = SurrealIdempotencyRepository<Db>;

pub const WEBHOOK_SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
pub const FIRST_PARTY_SECRET: &str = "first-party-secret";

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        downstream_jwt_secret: "downstream-secret".into(),
        fallback_jwt_secret: Some(FIRST_PARTY_SECRET.into()),
        webhook_secret: WEBHOOK_SECRET.into(),
        ..AuthConfig::default()
    }
}

pub struct Harness {
    pub tenants: Arc<Tenants>,
    pub users: Arc<Users>,
    pub backend: Arc<SurrealTenantStore>,
    pub router: Arc<ConnectionRouter<SurrealTenantStore>>,
    pub ledger: Arc<IdempotencyLedger<LedgerStore>>,
    pub auth: Arc<AuthConfig>,
    pub config: EngineConfig,
    pub provisioner: Arc<Provisioner<Tenants, Users, SurrealTenantStore>>,
    pub queue: ProvisioningQueue,
}

/// Helper: spin up in-memory DB, run migrations and wire the engine.
pub async fn setup() -> Harness {
    setup_with(EngineConfig::default()).await
}

pub async fn setup_with(config: EngineConfig) -> Harness {
    let db: Surreal<Db> = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    orgplane_db::run_migrations(&db).await.unwrap();

    let tenants = Arc::new(SurrealTenantRepository::new(db.clone()));
    let users = Arc::new(SurrealGlobalUserRepository::new(db.clone()));
    let ledger = Arc::new(IdempotencyLedger::new(SurrealIdempotencyRepository::new(
        db.clone(),
    )));
    let backend = Arc::new(SurrealTenantStore::new(TenantStoreConfig::default()));
    let router = Arc::new(ConnectionRouter::new(backend.clone()));
    let auth = Arc::new(auth_config());

    let provisioner = Arc::new(Provisioner::new(
        tenants.clone(),
        users.clone(),
        backend.clone(),
        router.clone(),
        auth.clone(),
        config.clone(),
    ));
    let (queue, _worker) = ProvisioningQueue::spawn(provisioner.clone(), config.queue_capacity);

    Harness {
        tenants,
        users,
        backend,
        router,
        ledger,
        auth,
        config,
        provisioner,
        queue,
    }
}

impl Harness {
    pub fn registration(&self) -> RegistrationService<Tenants, Users, SurrealTenantStore, LedgerStore> {
        RegistrationService::new(
            self.provisioner.clone(),
            self.ledger.clone(),
            self.auth.clone(),
            self.config.clone(),
        )
    }

    pub fn webhooks(&self) -> WebhookRouter<Tenants, Users, LedgerStore> {
        WebhookRouter::new(
            EventHandlers::new(self.tenants.clone(), self.users.clone(), self.queue.clone()),
            self.ledger.clone(),
            self.auth.clone(),
        )
    }

    pub fn bridge(&self) -> TokenBridge<Tenants, Users, SurrealTenantStore> {
        TokenBridge::new(
            self.tenants.clone(),
            self.users.clone(),
            self.backend.clone(),
            self.router.clone(),
            Arc::new(VerifierChain::from_config(&self.auth).unwrap()),
            self.auth.clone(),
        )
    }

    /// Poll until the queue worker has settled the tenant for `org_id`.
    pub async fn wait_for_org(&self, org_id: &str) -> Tenant {
        for _ in 0..200 {
            if let Some(tenant) = self.tenants.find_by_external_org(org_id).await.unwrap()
                && !tenant.status.is_in_flight()
            {
                return tenant;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("tenant for {org_id} never settled");
    }

    pub async fn wait_for_active(&self, org_id: &str) -> Tenant {
        let tenant = self.wait_for_org(org_id).await;
        assert_eq!(tenant.status, TenantStatus::Active);
        tenant
    }
}

/// Sign an event the way the provider does.
pub fn envelope(id: &str, body: serde_json::Value) -> WebhookEnvelope {
    let payload = serde_json::to_vec(&body).unwrap();
    let timestamp = Utc::now().timestamp().to_string();
    let signature = signature::sign(WEBHOOK_SECRET, id, &timestamp, &payload).unwrap();
    WebhookEnvelope {
        id: id.into(),
        timestamp,
        signature,
        payload,
    }
}

/// HS256 credential from the trusted first party.
pub fn first_party_token(claims: serde_json::Value) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(FIRST_PARTY_SECRET.as_bytes()),
    )
    .unwrap()
}
