//! SurrealDB connection management.

use surrealdb::Surreal;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use tracing::info;

/// Configuration for connecting to the control-plane database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Endpoint URL (e.g., `ws://127.0.0.1:8000` or `mem://`).
    pub url: String,
    /// SurrealDB namespace.
    pub namespace: String,
    /// SurrealDB database name.
    pub database: String,
    /// Root username. Empty disables sign-in.
    pub username: String,
    /// Root password.
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000".into(),
            namespace: "orgplane".into(),
            database: "control".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

/// Embedded engines have no root user to sign in as.
pub(crate) fn is_embedded(url: &str) -> bool {
    url.starts_with("mem://") || url.starts_with("rocksdb://") || url.starts_with("surrealkv://")
}

/// Connect to `url`, sign in as root when credentials apply, and select
/// `namespace`/`database`.
pub(crate) async fn open(
    url: &str,
    username: &str,
    password: &str,
    namespace: &str,
    database: &str,
) -> Result<Surreal<Any>, surrealdb::Error> {
    let db = any::connect(url).await?;

    if !username.is_empty() && !is_embedded(url) {
        db.signin(Root {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await?;
    }

    db.use_ns(namespace).use_db(database).await?;
    Ok(db)
}

/// Manages the control-plane connection.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Any>,
}

impl DbManager {
    /// Connect using the provided configuration and return a ready-to-use
    /// manager.
    pub async fn connect(config: &DbConfig) -> Result<Self, surrealdb::Error> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let db = open(
            &config.url,
            &config.username,
            &config.password,
            &config.namespace,
            &config.database,
        )
        .await?;

        info!("Successfully connected to SurrealDB");

        Ok(Self { db })
    }

    /// Returns a reference to the underlying SurrealDB client.
    pub fn client(&self) -> &Surreal<Any> {
        &self.db
    }
}
