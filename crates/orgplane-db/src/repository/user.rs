//! SurrealDB implementation of [`GlobalUserRepository`].
//!
//! Emails are lowercased before every write and lookup. The external
//! user id is reserved in `user_external_link`, so a user without one
//! never blocks another.

use chrono::{DateTime, Utc};
use orgplane_core::error::{PlaneError, PlaneResult};
use orgplane_core::models::user::{
    CreateGlobalUser, GlobalUser, UpdateGlobalUser, UserRole, UserUpsert, normalize_email,
};
use orgplane_core::repository::GlobalUserRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct GlobalUserRow {
    email: String,
    external_user_id: Option<String>,
    tenant_id: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    role: String,
    password_hash: Option<String>,
    active: bool,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GlobalUserRow {
    fn into_user(self, id: Uuid) -> Result<GlobalUser, DbError> {
        let tenant_id = self
            .tenant_id
            .map(|t| Uuid::parse_str(&t))
            .transpose()
            .map_err(|e| DbError::Decode(format!("invalid tenant UUID: {e}")))?;
        let role: UserRole = self
            .role
            .parse()
            .map_err(|_| DbError::Decode(format!("unknown user role: {}", self.role)))?;
        Ok(GlobalUser {
            id,
            email: self.email,
            external_user_id: self.external_user_id,
            tenant_id,
            first_name: self.first_name,
            last_name: self.last_name,
            role,
            password_hash: self.password_hash,
            active: self.active,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct UserIdRow {
    record_id: String,
}

#[derive(Debug, SurrealValue)]
struct ExternalLinkRow {
    user_id: String,
}

fn parse_id(raw: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::Decode(format!("invalid user UUID: {e}")))
}

/// SurrealDB implementation of the global user registry.
#[derive(Clone)]
pub struct SurrealGlobalUserRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealGlobalUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn get(&self, id: Uuid) -> PlaneResult<GlobalUser> {
        self.find_by_id(id).await?.ok_or_else(|| {
            DbError::NotFound {
                entity: "global_user".into(),
                id: id.to_string(),
            }
            .into()
        })
    }

    async fn lookup_existing(&self, input: &CreateGlobalUser) -> PlaneResult<Option<GlobalUser>> {
        if let Some(external_id) = &input.external_user_id
            && let Some(user) = self.find_by_external_id(external_id).await?
        {
            return Ok(Some(user));
        }
        self.find_by_email(&input.email).await
    }
}

impl<C: Connection> GlobalUserRepository for SurrealGlobalUserRepository<C> {
    async fn create(&self, input: CreateGlobalUser) -> PlaneResult<GlobalUser> {
        let id = Uuid::new_v4();
        let email = normalize_email(&input.email);
        if email.is_empty() {
            return Err(PlaneError::validation("email must not be empty"));
        }

        let mut query = String::from(
            "BEGIN TRANSACTION; \
             CREATE type::record('global_user', $id) SET \
             email = $email, external_user_id = $external_id, \
             tenant_id = $tenant_id, \
             first_name = $first_name, last_name = $last_name, \
             role = $role, password_hash = $password_hash, \
             active = true, last_login_at = NONE;",
        );
        if input.external_user_id.is_some() {
            query.push_str(
                " CREATE type::record('user_external_link', $external_id) \
                 SET user_id = $id;",
            );
        }
        query.push_str(" COMMIT TRANSACTION;");

        let result = self
            .db
            .query(query)
            .bind(("id", id.to_string()))
            .bind(("email", email.clone()))
            .bind(("external_id", input.external_user_id.clone()))
            .bind(("tenant_id", input.tenant_id.map(|t| t.to_string())))
            .bind(("first_name", input.first_name))
            .bind(("last_name", input.last_name))
            .bind(("role", input.role.as_str()))
            .bind(("password_hash", input.password_hash))
            .await
            .map_err(DbError::from)?;

        if let Err(e) = result.check() {
            let key = CreateGlobalUser {
                email,
                external_user_id: input.external_user_id,
                ..Default::default()
            };
            return match self.lookup_existing(&key).await? {
                Some(_) => Err(PlaneError::AlreadyExists {
                    entity: "global_user".into(),
                }),
                None => Err(DbError::Query(e.to_string()).into()),
            };
        }

        debug!(user_id = %id, "Global user created");
        self.get(id).await
    }

    async fn find_by_id(&self, id: Uuid) -> PlaneResult<Option<GlobalUser>> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('global_user', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GlobalUserRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.into_user(id))
            .transpose()?)
    }

    async fn find_by_email(&self, email: &str) -> PlaneResult<Option<GlobalUser>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id FROM global_user WHERE email = $email")
            .bind(("email", normalize_email(email)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserIdRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => self.find_by_id(parse_id(&row.record_id)?).await,
            None => Ok(None),
        }
    }

    async fn find_by_external_id(&self, external_user_id: &str) -> PlaneResult<Option<GlobalUser>> {
        let mut result = self
            .db
            .query("SELECT user_id FROM type::record('user_external_link', $external_id)")
            .bind(("external_id", external_user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ExternalLinkRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => self.find_by_id(parse_id(&row.user_id)?).await,
            None => Ok(None),
        }
    }

    async fn upsert(&self, input: CreateGlobalUser) -> PlaneResult<UserUpsert> {
        if let Some(user) = self.lookup_existing(&input).await? {
            return Ok(UserUpsert {
                user,
                created: false,
            });
        }

        let key = CreateGlobalUser {
            email: input.email.clone(),
            external_user_id: input.external_user_id.clone(),
            ..Default::default()
        };
        match self.create(input).await {
            Ok(user) => Ok(UserUpsert {
                user,
                created: true,
            }),
            // A concurrent writer created the same user first; converge on it.
            Err(PlaneError::AlreadyExists { .. }) => {
                let user = self.lookup_existing(&key).await?.ok_or_else(|| {
                    PlaneError::Database("user vanished after a conflicting insert".into())
                })?;
                Ok(UserUpsert {
                    user,
                    created: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn update(&self, id: Uuid, input: UpdateGlobalUser) -> PlaneResult<GlobalUser> {
        let current = self.get(id).await?;

        let attach_external = match (&current.external_user_id, &input.external_user_id) {
            (None, Some(external_id)) => Some(external_id.clone()),
            (Some(existing), Some(requested)) if existing != requested => {
                return Err(PlaneError::validation(format!(
                    "user {id} already carries external id {existing}"
                )));
            }
            _ => None,
        };

        let email = input.email.as_deref().map(normalize_email);

        let mut sets = Vec::new();
        if email.is_some() {
            sets.push("email = $email");
        }
        if input.first_name.is_some() {
            sets.push("first_name = $first_name");
        }
        if input.last_name.is_some() {
            sets.push("last_name = $last_name");
        }
        if input.role.is_some() {
            sets.push("role = $role");
        }
        if input.password_hash.is_some() {
            sets.push("password_hash = $password_hash");
        }
        if attach_external.is_some() {
            sets.push("external_user_id = $external_id");
        }
        match &input.tenant_id {
            Some(Some(_)) => sets.push("tenant_id = $tenant_id"),
            Some(None) => sets.push("tenant_id = NONE"),
            None => {}
        }
        sets.push("updated_at = time::now()");

        let mut query = String::from("BEGIN TRANSACTION; ");
        if attach_external.is_some() {
            query.push_str(
                "CREATE type::record('user_external_link', $external_id) \
                 SET user_id = $id; ",
            );
        }
        query.push_str(&format!(
            "UPDATE type::record('global_user', $id) SET {}; COMMIT TRANSACTION;",
            sets.join(", ")
        ));

        let mut builder = self.db.query(&query).bind(("id", id.to_string()));
        if let Some(email) = email.clone() {
            builder = builder.bind(("email", email));
        }
        if let Some(first_name) = input.first_name {
            builder = builder.bind(("first_name", first_name));
        }
        if let Some(last_name) = input.last_name {
            builder = builder.bind(("last_name", last_name));
        }
        if let Some(role) = input.role {
            builder = builder.bind(("role", role.as_str()));
        }
        if let Some(password_hash) = input.password_hash {
            builder = builder.bind(("password_hash", password_hash));
        }
        if let Some(external_id) = attach_external.clone() {
            builder = builder.bind(("external_id", external_id));
        }
        if let Some(Some(tenant_id)) = input.tenant_id {
            builder = builder.bind(("tenant_id", tenant_id.to_string()));
        }

        let result = builder.await.map_err(DbError::from)?;
        if let Err(e) = result.check() {
            if let Some(external_id) = &attach_external
                && self.find_by_external_id(external_id).await?.is_some()
            {
                return Err(PlaneError::AlreadyExists {
                    entity: "global_user".into(),
                });
            }
            if let Some(email) = &email
                && let Some(other) = self.find_by_email(email).await?
                && other.id != id
            {
                return Err(PlaneError::AlreadyExists {
                    entity: "global_user".into(),
                });
            }
            return Err(DbError::Query(e.to_string()).into());
        }

        self.get(id).await
    }

    async fn touch_last_login(&self, id: Uuid) -> PlaneResult<()> {
        let result = self
            .db
            .query(
                "UPDATE type::record('global_user', $id) SET \
                 last_login_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        info!(user_id = %id, "Recorded login");
        Ok(())
    }
}
