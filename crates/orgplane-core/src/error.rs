//! Error types for the orgplane control plane.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaneError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Tenant already exists with {field} '{value}'")]
    DuplicateTenant { field: String, value: String },

    #[error("External organization {org_id} is already linked to another tenant")]
    ConflictingLink { org_id: String },

    #[error("Illegal tenant status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Storage unavailable: {0}")]
    Database(String),

    #[error("Could not derive a unique slug from '{base}' after {attempts} attempts")]
    SlugExhausted { base: String, attempts: u32 },

    #[error("Provisioning failed for tenant {tenant_id}: {reason}")]
    Provisioning { tenant_id: String, reason: String },

    #[error("Invalid webhook signature: {reason}")]
    InvalidSignature { reason: String },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Credential carries no organization claim")]
    MissingOrganization,

    #[error("No active tenant is provisioned for organization {org_id}")]
    TenantNotProvisioned { org_id: String },

    #[error("Could not link user to workspace: {reason}")]
    LinkageFailure { reason: String },

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaneError {
    /// Stable machine-readable code, safe to expose across the API boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            PlaneError::NotFound { .. } => "not_found",
            PlaneError::AlreadyExists { .. } => "already_exists",
            PlaneError::DuplicateTenant { .. } => "duplicate_tenant",
            PlaneError::ConflictingLink { .. } => "conflicting_link",
            PlaneError::InvalidTransition { .. } => "invalid_transition",
            PlaneError::Validation { .. } => "validation_error",
            PlaneError::Database(_) => "storage_unavailable",
            PlaneError::SlugExhausted { .. } => "slug_exhausted",
            PlaneError::Provisioning { .. } => "provisioning_failed",
            PlaneError::InvalidSignature { .. } => "invalid_signature",
            PlaneError::AuthenticationFailed { .. } => "authentication_failed",
            PlaneError::MissingOrganization => "missing_organization",
            PlaneError::TenantNotProvisioned { .. } => "tenant_not_provisioned",
            PlaneError::LinkageFailure { .. } => "linkage_failure",
            PlaneError::Crypto(_) => "crypto_error",
            PlaneError::Internal(_) => "internal_error",
        }
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlaneError::Database(_))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PlaneError::Validation {
            message: message.into(),
        }
    }
}

pub type PlaneResult<T> = Result<T, PlaneError>;
