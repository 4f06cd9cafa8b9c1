//! Process-wide application state: one registry connection, one connection
//! router and the engine services built on them.

use std::sync::Arc;

use anyhow::{Context, Result};
use orgplane_auth::VerifierChain;
use orgplane_db::repository::{
    SurrealGlobalUserRepository, SurrealIdempotencyRepository, SurrealTenantRepository,
};
use orgplane_db::{DbManager, SurrealTenantStore};
use orgplane_engine::{
    ConnectionRouter, EventHandlers, IdempotencyLedger, Provisioner, ProvisioningQueue,
    RegistrationService, TokenBridge, WebhookRouter,
};
use surrealdb::engine::any::Any;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ServerConfig;

pub type Tenants = SurrealTenantRepository<Any>;
pub type Users = SurrealGlobalUserRepository<Any>;
pub type LedgerStore = SurrealIdempotencyRepository<Any>;
pub type Backend = SurrealTenantStore;

#[derive(Clone)]
pub struct AppState {
    pub registration: Arc<RegistrationService<Tenants, Users, Backend, LedgerStore>>,
    pub webhooks: Arc<WebhookRouter<Tenants, Users, LedgerStore>>,
    pub bridge: Arc<TokenBridge<Tenants, Users, Backend>>,
    pub ledger: Arc<IdempotencyLedger<LedgerStore>>,
}

impl AppState {
    /// Connect, migrate and wire every service. Also starts the
    /// provisioning queue worker, whose handle is returned.
    pub async fn initialize(config: &ServerConfig) -> Result<(Self, JoinHandle<()>)> {
        let manager = DbManager::connect(&config.db)
            .await
            .context("connect to control-plane database")?;
        let db = manager.client().clone();
        orgplane_db::run_migrations(&db)
            .await
            .context("run control-plane migrations")?;

        let tenants = Arc::new(SurrealTenantRepository::new(db.clone()));
        let users = Arc::new(SurrealGlobalUserRepository::new(db.clone()));
        let ledger = Arc::new(IdempotencyLedger::new(SurrealIdempotencyRepository::new(db)));

        let auth = Arc::new(config.auth.clone());
        let verifiers =
            Arc::new(VerifierChain::from_config(&auth).context("build credential verifiers")?);
        info!(verifiers = ?verifiers.names(), "Credential verifiers configured");

        let backend = Arc::new(SurrealTenantStore::new(config.tenant_store.clone()));
        let router = Arc::new(ConnectionRouter::new(backend.clone()));

        let provisioner = Arc::new(Provisioner::new(
            tenants.clone(),
            users.clone(),
            backend.clone(),
            router.clone(),
            auth.clone(),
            config.engine.clone(),
        ));
        let (queue, worker) =
            ProvisioningQueue::spawn(provisioner.clone(), config.engine.queue_capacity);

        let state = Self {
            registration: Arc::new(RegistrationService::new(
                provisioner,
                ledger.clone(),
                auth.clone(),
                config.engine.clone(),
            )),
            webhooks: Arc::new(WebhookRouter::new(
                EventHandlers::new(tenants.clone(), users.clone(), queue),
                ledger.clone(),
                auth.clone(),
            )),
            bridge: Arc::new(TokenBridge::new(
                tenants, users, backend, router, verifiers, auth,
            )),
            ledger,
        };
        Ok((state, worker))
    }
}
