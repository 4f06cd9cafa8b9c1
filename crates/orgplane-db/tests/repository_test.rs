//! Integration tests for the tenant registry using in-memory SurrealDB.

use orgplane_core::error::PlaneError;
use orgplane_core::models::tenant::{CreateTenant, PlanTier, TenantStatus};
use orgplane_core::repository::TenantRepository;
use orgplane_db::repository::SurrealTenantRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;
use uuid::Uuid;

/// Helper: spin up in-memory DB and run migrations.
async fn setup() -> Surreal<surrealdb::engine::local::Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    orgplane_db::run_migrations(&db).await.unwrap();
    db
}

fn new_tenant(slug: &str, org: Option<&str>) -> CreateTenant {
    CreateTenant {
        name: format!("{slug} inc"),
        slug: slug.into(),
        external_org_id: org.map(Into::into),
        plan: PlanTier::Free,
    }
}

// -----------------------------------------------------------------------
// Create & lookup
// -----------------------------------------------------------------------

#[tokio::test]
async fn create_and_find_tenant() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);

    let tenant = repo
        .create(new_tenant("acme-inc", Some("org_42")))
        .await
        .unwrap();

    assert_eq!(tenant.slug, "acme-inc");
    assert_eq!(tenant.status, TenantStatus::Pending);
    assert_eq!(tenant.external_org_id.as_deref(), Some("org_42"));
    assert!(tenant.connection_descriptor.is_none());

    let by_id = repo.find_by_id(tenant.id).await.unwrap().unwrap();
    assert_eq!(by_id.slug, tenant.slug);

    let by_slug = repo.find_by_slug("acme-inc").await.unwrap().unwrap();
    assert_eq!(by_slug.id, tenant.id);

    let by_org = repo.find_by_external_org("org_42").await.unwrap().unwrap();
    assert_eq!(by_org.id, tenant.id);
}

#[tokio::test]
async fn missing_tenants_are_none() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);

    assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    assert!(repo.find_by_slug("nope").await.unwrap().is_none());
    assert!(repo.find_by_external_org("org_x").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_slug_is_rejected() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);

    repo.create(new_tenant("acme", None)).await.unwrap();
    let err = repo.create(new_tenant("acme", None)).await.unwrap_err();

    assert!(
        matches!(err, PlaneError::DuplicateTenant { ref field, .. } if field == "slug"),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn duplicate_external_org_is_rejected() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);

    repo.create(new_tenant("acme", Some("org_1"))).await.unwrap();
    let err = repo
        .create(new_tenant("acme-two", Some("org_1")))
        .await
        .unwrap_err();

    assert!(
        matches!(err, PlaneError::DuplicateTenant { ref field, .. } if field == "external_org_id"),
        "unexpected error: {err:?}"
    );
    assert!(repo.find_by_slug("acme-two").await.unwrap().is_none());
}

#[tokio::test]
async fn tenants_without_org_do_not_collide() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);

    repo.create(new_tenant("one", None)).await.unwrap();
    repo.create(new_tenant("two", None)).await.unwrap();
}

// -----------------------------------------------------------------------
// Status transitions
// -----------------------------------------------------------------------

#[tokio::test]
async fn status_follows_lifecycle() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);
    let tenant = repo.create(new_tenant("acme", None)).await.unwrap();

    let t = repo
        .set_status(tenant.id, TenantStatus::Provisioning)
        .await
        .unwrap();
    assert_eq!(t.status, TenantStatus::Provisioning);

    let t = repo.set_status(tenant.id, TenantStatus::Active).await.unwrap();
    assert_eq!(t.status, TenantStatus::Active);

    let err = repo
        .set_status(tenant.id, TenantStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(err, PlaneError::InvalidTransition { .. }));

    let still = repo.find_by_id(tenant.id).await.unwrap().unwrap();
    assert_eq!(still.status, TenantStatus::Active);
}

#[tokio::test]
async fn pending_cannot_skip_to_active() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);
    let tenant = repo.create(new_tenant("acme", None)).await.unwrap();

    let err = repo
        .set_status(tenant.id, TenantStatus::Active)
        .await
        .unwrap_err();
    assert!(matches!(err, PlaneError::InvalidTransition { .. }));
}

#[tokio::test]
async fn setting_current_status_is_a_no_op() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);
    let tenant = repo.create(new_tenant("acme", None)).await.unwrap();

    let t = repo
        .set_status(tenant.id, TenantStatus::Pending)
        .await
        .unwrap();
    assert_eq!(t.status, TenantStatus::Pending);
}

#[tokio::test]
async fn set_status_on_missing_tenant_is_not_found() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);

    let err = repo
        .set_status(Uuid::new_v4(), TenantStatus::Provisioning)
        .await
        .unwrap_err();
    assert!(matches!(err, PlaneError::NotFound { .. }));
}

#[tokio::test]
async fn connection_descriptor_is_recorded() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);
    let tenant = repo.create(new_tenant("acme", None)).await.unwrap();

    let t = repo
        .set_connection(tenant.id, "mem://?ns=tenants&db=tenant_acme")
        .await
        .unwrap();
    assert_eq!(
        t.connection_descriptor.as_deref(),
        Some("mem://?ns=tenants&db=tenant_acme")
    );
}

// -----------------------------------------------------------------------
// External org linkage
// -----------------------------------------------------------------------

#[tokio::test]
async fn link_external_org_late() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);
    let tenant = repo.create(new_tenant("acme", None)).await.unwrap();

    let linked = repo.link_external_org(tenant.id, "org_9").await.unwrap();
    assert_eq!(linked.external_org_id.as_deref(), Some("org_9"));

    // Linking again is idempotent.
    let again = repo.link_external_org(tenant.id, "org_9").await.unwrap();
    assert_eq!(again.id, tenant.id);

    let by_org = repo.find_by_external_org("org_9").await.unwrap().unwrap();
    assert_eq!(by_org.id, tenant.id);
}

#[tokio::test]
async fn link_owned_org_conflicts() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);
    repo.create(new_tenant("owner", Some("org_7"))).await.unwrap();
    let other = repo.create(new_tenant("other", None)).await.unwrap();

    let err = repo.link_external_org(other.id, "org_7").await.unwrap_err();
    assert!(matches!(err, PlaneError::ConflictingLink { .. }));

    let unchanged = repo.find_by_id(other.id).await.unwrap().unwrap();
    assert!(unchanged.external_org_id.is_none());
}
