//! Contracts for the downstream application whose per-tenant stores the
//! control plane allocates, opens and seeds.
//!
//! The downstream schema is opaque here. Implementations live outside
//! this crate (a SurrealDB-backed one ships in `orgplane-db`).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PlaneResult;

/// Seeding steps an initializer may or may not support.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OptionalStep {
    DefaultSettings,
    ObjectPermissions,
}

impl OptionalStep {
    pub const ALL: [OptionalStep; 2] = [OptionalStep::DefaultSettings, OptionalStep::ObjectPermissions];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionalStep::DefaultSettings => "default_settings",
            OptionalStep::ObjectPermissions => "object_permissions",
        }
    }
}

/// Optional steps an initializer declares it can perform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(BTreeSet<OptionalStep>);

impl CapabilitySet {
    pub fn new(steps: impl IntoIterator<Item = OptionalStep>) -> Self {
        Self(steps.into_iter().collect())
    }

    pub fn supports(&self, step: OptionalStep) -> bool {
        self.0.contains(&step)
    }

    pub fn iter(&self) -> impl Iterator<Item = OptionalStep> + '_ {
        self.0.iter().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

impl StepReport {
    pub fn applied(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            outcome: StepOutcome::Applied,
        }
    }

    pub fn skipped(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            outcome: StepOutcome::Skipped {
                reason: reason.into(),
            },
        }
    }
}

/// A user as materialized inside a tenant store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamUser {
    /// Preferred id; an existing user with the same email keeps theirs.
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Membership of a downstream user in a workspace.
/// Unique per `(user_id, workspace_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceLinkage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub workspace_id: Uuid,
}

/// Everything the initializer needs to seed a fresh tenant store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSeed {
    pub tenant_id: Uuid,
    pub display_name: String,
    pub admin: Option<DownstreamUser>,
    pub external_org_id: Option<String>,
    /// Requested optional steps. Unsupported ones come back as skipped.
    pub optional_steps: Vec<OptionalStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializedWorkspace {
    pub workspace_id: Uuid,
    pub admin_linkage: Option<WorkspaceLinkage>,
    pub steps: Vec<StepReport>,
}

/// Opens live handles to tenant stores from their connection descriptor.
pub trait ConnectionFactory: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    fn open(&self, descriptor: &str) -> impl Future<Output = PlaneResult<Self::Handle>> + Send;
}

/// Creates the isolated data store for a new tenant.
pub trait StoreAllocator: Send + Sync {
    /// Returns the connection descriptor of the new store.
    fn allocate(
        &self,
        tenant_id: Uuid,
        slug: &str,
    ) -> impl Future<Output = PlaneResult<String>> + Send;
}

/// Seeds a freshly allocated store. Must be safe to call twice for the
/// same tenant.
pub trait WorkspaceInitializer: ConnectionFactory {
    fn capabilities(&self) -> CapabilitySet;

    fn initialize(
        &self,
        handle: &Self::Handle,
        seed: &WorkspaceSeed,
    ) -> impl Future<Output = PlaneResult<InitializedWorkspace>> + Send;
}

/// Per-tenant user and membership operations used by the token bridge.
pub trait WorkspaceStore: ConnectionFactory {
    fn primary_workspace(
        &self,
        handle: &Self::Handle,
    ) -> impl Future<Output = PlaneResult<Option<Uuid>>> + Send;

    /// Returns the id of the user holding `user.email`, creating it if absent.
    fn ensure_user(
        &self,
        handle: &Self::Handle,
        user: &DownstreamUser,
    ) -> impl Future<Output = PlaneResult<Uuid>> + Send;

    fn ensure_linkage(
        &self,
        handle: &Self::Handle,
        user_id: Uuid,
        workspace_id: Uuid,
    ) -> impl Future<Output = PlaneResult<WorkspaceLinkage>> + Send;
}

/// Everything the engine needs from the downstream application.
pub trait DownstreamBackend: StoreAllocator + WorkspaceInitializer + WorkspaceStore {}

impl<T> DownstreamBackend for T where T: StoreAllocator + WorkspaceInitializer + WorkspaceStore {}
