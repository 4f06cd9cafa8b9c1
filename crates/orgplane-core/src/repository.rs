//! Repository trait definitions for the control-plane catalog.
//!
//! All repository operations are async. Uniqueness and compare-and-set
//! guarantees are delegated to the backing store; callers never hold a
//! lock of their own.

use chrono::Duration;
use uuid::Uuid;

use crate::error::PlaneResult;
use crate::models::{
    idempotency::IdempotencyRecord,
    tenant::{CreateTenant, Tenant, TenantStatus},
    user::{CreateGlobalUser, GlobalUser, UpdateGlobalUser, UserUpsert},
};

// ---------------------------------------------------------------------------
// Tenant registry
// ---------------------------------------------------------------------------

pub trait TenantRepository: Send + Sync {
    /// Insert a `Pending` tenant. Fails with `DuplicateTenant` when the slug
    /// or external org id is already taken.
    fn create(&self, input: CreateTenant) -> impl Future<Output = PlaneResult<Tenant>> + Send;
    fn find_by_id(&self, id: Uuid) -> impl Future<Output = PlaneResult<Option<Tenant>>> + Send;
    fn find_by_slug(&self, slug: &str)
    -> impl Future<Output = PlaneResult<Option<Tenant>>> + Send;
    fn find_by_external_org(
        &self,
        org_id: &str,
    ) -> impl Future<Output = PlaneResult<Option<Tenant>>> + Send;
    /// Compare-and-set against the current status; rejects illegal
    /// transitions with `InvalidTransition`.
    fn set_status(
        &self,
        id: Uuid,
        status: TenantStatus,
    ) -> impl Future<Output = PlaneResult<Tenant>> + Send;
    fn set_connection(
        &self,
        id: Uuid,
        descriptor: &str,
    ) -> impl Future<Output = PlaneResult<Tenant>> + Send;
    /// Idempotent for the owning tenant; `ConflictingLink` otherwise.
    fn link_external_org(
        &self,
        id: Uuid,
        org_id: &str,
    ) -> impl Future<Output = PlaneResult<Tenant>> + Send;
}

// ---------------------------------------------------------------------------
// Global users
// ---------------------------------------------------------------------------

pub trait GlobalUserRepository: Send + Sync {
    /// Fails with `AlreadyExists` on an email or external id collision.
    fn create(
        &self,
        input: CreateGlobalUser,
    ) -> impl Future<Output = PlaneResult<GlobalUser>> + Send;
    fn find_by_id(&self, id: Uuid)
    -> impl Future<Output = PlaneResult<Option<GlobalUser>>> + Send;
    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = PlaneResult<Option<GlobalUser>>> + Send;
    fn find_by_external_id(
        &self,
        external_user_id: &str,
    ) -> impl Future<Output = PlaneResult<Option<GlobalUser>>> + Send;
    /// Find by external id, then by email; create when neither matches.
    /// Concurrent callers converge on a single record.
    fn upsert(&self, input: CreateGlobalUser)
    -> impl Future<Output = PlaneResult<UserUpsert>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateGlobalUser,
    ) -> impl Future<Output = PlaneResult<GlobalUser>> + Send;
    fn touch_last_login(&self, id: Uuid) -> impl Future<Output = PlaneResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Idempotency ledger storage
// ---------------------------------------------------------------------------

pub trait IdempotencyRepository: Send + Sync {
    /// Atomically insert a `processing` row. Returns `false` when a row for
    /// the key already exists.
    fn insert_processing(
        &self,
        key: &str,
        operation: &str,
    ) -> impl Future<Output = PlaneResult<bool>> + Send;
    fn get(&self, key: &str) -> impl Future<Output = PlaneResult<Option<IdempotencyRecord>>> + Send;
    /// Only moves a `processing` row. Returns whether a row changed.
    fn mark_completed(
        &self,
        key: &str,
        result: &serde_json::Value,
    ) -> impl Future<Output = PlaneResult<bool>> + Send;
    /// Only moves a `processing` row. Returns whether a row changed.
    fn mark_failed(&self, key: &str, error: &str)
    -> impl Future<Output = PlaneResult<bool>> + Send;
    /// Delete a row still in `processing`. Returns whether a row was removed.
    fn delete_processing(&self, key: &str) -> impl Future<Output = PlaneResult<bool>> + Send;
    /// Delete terminal rows last touched more than `older_than` ago.
    fn purge_terminal(&self, older_than: Duration)
    -> impl Future<Output = PlaneResult<u64>> + Send;
    /// `processing` rows created more than `older_than` ago.
    fn list_stale_processing(
        &self,
        older_than: Duration,
    ) -> impl Future<Output = PlaneResult<Vec<IdempotencyRecord>>> + Send;
}
