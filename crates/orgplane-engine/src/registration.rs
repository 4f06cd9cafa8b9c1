//! Organization self-registration: validation, idempotency and the bounded
//! synchronous wait around provisioning.

use std::sync::Arc;

use chrono::Utc;
use orgplane_auth::AuthConfig;
use orgplane_core::downstream::{DownstreamBackend, StepReport};
use orgplane_core::error::{PlaneError, PlaneResult};
use orgplane_core::models::idempotency::{IdempotencyKey, IdempotencyStatus};
use orgplane_core::models::provisioning::{
    AdminCredentials, JobOrigin, ProvisionRequest, ProvisionedTenant,
};
use orgplane_core::models::tenant::PlanTier;
use orgplane_core::models::user::normalize_email;
use orgplane_core::repository::{GlobalUserRepository, IdempotencyRepository, TenantRepository};
use orgplane_core::slug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::ledger::{BeginOutcome, IdempotencyLedger};
use crate::provisioning::{Provisioner, random_suffix};

const MAX_KEY_LEN: usize = 255;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationInput {
    pub organization_name: String,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub admin_first_name: Option<String>,
    pub admin_last_name: Option<String>,
    pub plan: Option<String>,
    pub idempotency_key: Option<String>,
}

/// What a completed registration replays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResult {
    pub tenant_id: Uuid,
    pub slug: String,
    pub status: String,
    pub connection_descriptor: Option<String>,
    pub workspace_id: Uuid,
    pub admin_user_id: Option<Uuid>,
    pub access_token: Option<String>,
    pub steps: Vec<StepReport>,
}

impl From<ProvisionedTenant> for RegistrationResult {
    fn from(p: ProvisionedTenant) -> Self {
        Self {
            tenant_id: p.tenant.id,
            slug: p.tenant.slug,
            status: p.tenant.status.as_str().into(),
            connection_descriptor: p.tenant.connection_descriptor,
            workspace_id: p.workspace_id,
            admin_user_id: p.admin_user_id,
            access_token: p.access_token,
            steps: p.steps,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    Completed { result: Value, cached: bool },
    /// Still running; poll with the key.
    Processing { key: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationStatus {
    Processing,
    Completed(Value),
    Failed(String),
}

struct ValidRegistration {
    request: ProvisionRequest,
    key: IdempotencyKey,
    /// Caller-facing key (without the operation prefix).
    token: String,
}

pub struct RegistrationService<T, U, B, R>
where
    T: TenantRepository,
    U: GlobalUserRepository,
    B: DownstreamBackend,
    R: IdempotencyRepository,
{
    provisioner: Arc<Provisioner<T, U, B>>,
    ledger: Arc<IdempotencyLedger<R>>,
    auth: Arc<AuthConfig>,
    config: EngineConfig,
}

impl<T, U, B, R> RegistrationService<T, U, B, R>
where
    T: TenantRepository + 'static,
    U: GlobalUserRepository + 'static,
    B: DownstreamBackend,
    R: IdempotencyRepository + 'static,
{
    pub fn new(
        provisioner: Arc<Provisioner<T, U, B>>,
        ledger: Arc<IdempotencyLedger<R>>,
        auth: Arc<AuthConfig>,
        config: EngineConfig,
    ) -> Self {
        Self {
            provisioner,
            ledger,
            auth,
            config,
        }
    }

    pub async fn register(&self, input: RegistrationInput) -> PlaneResult<RegistrationOutcome> {
        let valid = self.validate(input)?;

        match self.ledger.begin(&valid.key).await? {
            BeginOutcome::Started => {}
            BeginOutcome::AlreadyCompleted(result) => {
                info!(key = %valid.key, "Registration replayed from ledger");
                return Ok(RegistrationOutcome::Completed {
                    result,
                    cached: true,
                });
            }
            BeginOutcome::AlreadyProcessing => {
                return Ok(RegistrationOutcome::Processing { key: valid.token });
            }
            BeginOutcome::PreviouslyFailed(error) => {
                return Err(PlaneError::validation(format!(
                    "registration '{}' previously failed: {error}",
                    valid.token
                )));
            }
        }

        let provisioner = Arc::clone(&self.provisioner);
        let ledger = Arc::clone(&self.ledger);
        let key = valid.key.clone();
        let request = valid.request;

        // The task records its own outcome so the ledger settles even when
        // the caller stops waiting.
        let task = tokio::spawn(async move {
            let outcome = provisioner
                .provision(request, JobOrigin::Registration)
                .await
                .and_then(|provisioned| {
                    serde_json::to_value(RegistrationResult::from(provisioned))
                        .map_err(|e| PlaneError::Internal(format!("result encoding: {e}")))
                });

            let recorded = match &outcome {
                Ok(result) => ledger.complete(&key, result).await,
                // Raised before any row was written: free the key for a retry.
                Err(e) if e.is_transient() => ledger.release(&key).await,
                Err(e) => ledger.fail(&key, &e.to_string()).await,
            };
            if let Err(e) = recorded {
                error!(key = %key, error = %e, "Could not record registration outcome");
            }
            outcome
        });

        match tokio::time::timeout(self.config.registration_timeout, task).await {
            Ok(Ok(Ok(result))) => Ok(RegistrationOutcome::Completed {
                result,
                cached: false,
            }),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(join)) => {
                error!(key = %valid.key, error = %join, "Registration task aborted");
                Err(PlaneError::Internal("registration task aborted".into()))
            }
            Err(_) => {
                warn!(key = %valid.key, "Registration still provisioning after timeout");
                Ok(RegistrationOutcome::Processing { key: valid.token })
            }
        }
    }

    /// Status of a registration by its caller-facing key.
    pub async fn status(&self, token: &str) -> PlaneResult<RegistrationStatus> {
        let key = IdempotencyKey::registration(token);
        let record = self
            .ledger
            .lookup(&key)
            .await?
            .ok_or_else(|| PlaneError::NotFound {
                entity: "registration".into(),
                id: token.to_string(),
            })?;

        Ok(match record.status {
            IdempotencyStatus::Processing => RegistrationStatus::Processing,
            IdempotencyStatus::Completed => {
                RegistrationStatus::Completed(record.result.unwrap_or(Value::Null))
            }
            IdempotencyStatus::Failed => RegistrationStatus::Failed(record.error.unwrap_or_default()),
        })
    }

    fn validate(&self, input: RegistrationInput) -> PlaneResult<ValidRegistration> {
        let name = input.organization_name.trim().to_string();
        let name_len = name.chars().count();
        if !(2..=255).contains(&name_len) {
            return Err(PlaneError::validation(
                "organization_name must be between 2 and 255 characters",
            ));
        }
        let base = slug::normalize(&name);
        if base.is_empty() {
            return Err(PlaneError::validation(
                "organization_name must contain at least one letter or digit",
            ));
        }

        let plan = match input.plan.as_deref().map(str::trim) {
            None | Some("") => PlanTier::default(),
            Some(plan) => plan.parse()?,
        };

        let email = input
            .admin_email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty());
        if let Some(email) = &email
            && !is_plausible_email(email)
        {
            return Err(PlaneError::validation("admin_email is not a valid address"));
        }

        if let Some(password) = &input.admin_password {
            if email.is_none() {
                return Err(PlaneError::validation(
                    "admin_password requires admin_email",
                ));
            }
            if password.chars().count() < self.auth.min_password_length {
                return Err(PlaneError::validation(format!(
                    "admin_password must be at least {} characters",
                    self.auth.min_password_length
                )));
            }
        }

        let token = match input.idempotency_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => {
                if key.len() > MAX_KEY_LEN || key.chars().any(char::is_whitespace) {
                    return Err(PlaneError::validation(
                        "idempotency_key must be at most 255 characters without whitespace",
                    ));
                }
                key.to_string()
            }
            // Best effort: only protects this single attempt.
            _ => format!(
                "{base}:{}:{}",
                Utc::now().timestamp_millis(),
                random_suffix(8)
            ),
        };

        let admin = email.map(|email| AdminCredentials {
            email,
            password: input.admin_password,
            first_name: input.admin_first_name,
            last_name: input.admin_last_name,
            external_user_id: None,
        });

        Ok(ValidRegistration {
            key: IdempotencyKey::registration(&token),
            token,
            request: ProvisionRequest {
                organization_name: name,
                plan,
                admin,
                external_org_id: None,
            },
        })
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_plausibility() {
        assert!(is_plausible_email("ada@acme.io"));
        assert!(!is_plausible_email("ada@acme"));
        assert!(!is_plausible_email("@acme.io"));
        assert!(!is_plausible_email("ada acme@x.io"));
        assert!(!is_plausible_email("ada.acme.io"));
    }
}
