//! Integration tests for the SurrealDB tenant store on an embedded endpoint.

use orgplane_core::downstream::{
    CapabilitySet, ConnectionFactory, DownstreamUser, OptionalStep, StepOutcome, StoreAllocator,
    WorkspaceInitializer, WorkspaceSeed, WorkspaceStore,
};
use orgplane_core::error::PlaneError;
use orgplane_db::{ConnectionDescriptor, SurrealTenantStore, TenantStoreConfig};
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use uuid::Uuid;

fn store(capabilities: CapabilitySet) -> SurrealTenantStore {
    SurrealTenantStore::new(TenantStoreConfig {
        capabilities,
        ..TenantStoreConfig::default()
    })
}

async fn open_fresh(store: &SurrealTenantStore, slug: &str) -> (Uuid, Surreal<Any>) {
    let tenant_id = Uuid::new_v4();
    let descriptor = store.allocate(tenant_id, slug).await.unwrap();
    let handle = store.open(&descriptor).await.unwrap();
    (tenant_id, handle)
}

fn admin() -> DownstreamUser {
    DownstreamUser {
        id: Uuid::new_v4(),
        email: "Admin@Acme.io".into(),
        first_name: Some("Ada".into()),
        last_name: None,
    }
}

async fn count(handle: &Surreal<Any>, table: &str) -> usize {
    let mut result = handle
        .query(format!("SELECT meta::id(id) AS record_id FROM {table}"))
        .await
        .unwrap();
    let rows: Vec<surrealdb_types::Value> = result.take(0).unwrap();
    rows.len()
}

// -----------------------------------------------------------------------
// Allocation
// -----------------------------------------------------------------------

#[tokio::test]
async fn allocate_returns_parseable_descriptor() {
    let store = store(CapabilitySet::default());
    let descriptor = store.allocate(Uuid::new_v4(), "acme-inc").await.unwrap();

    let parsed: ConnectionDescriptor = descriptor.parse().unwrap();
    assert_eq!(parsed.endpoint, "mem://");
    assert_eq!(parsed.namespace, "tenants");
    assert_eq!(parsed.database, "tenant_acme_inc");
}

#[tokio::test]
async fn open_rejects_malformed_descriptor() {
    let store = store(CapabilitySet::default());
    let err = store.open("not a descriptor").await.unwrap_err();
    assert!(matches!(err, PlaneError::Validation { .. }), "{err:?}");
}

// -----------------------------------------------------------------------
// Initialization
// -----------------------------------------------------------------------

#[tokio::test]
async fn initialize_seeds_workspace_and_admin() {
    let store = store(CapabilitySet::new([OptionalStep::DefaultSettings]));
    let (tenant_id, handle) = open_fresh(&store, "acme").await;

    let seed = WorkspaceSeed {
        tenant_id,
        display_name: "Acme".into(),
        admin: Some(admin()),
        external_org_id: Some("org_1".into()),
        optional_steps: vec![OptionalStep::DefaultSettings],
    };
    let initialized = store.initialize(&handle, &seed).await.unwrap();

    let linkage = initialized.admin_linkage.expect("admin linkage");
    assert_eq!(linkage.workspace_id, initialized.workspace_id);
    assert!(
        initialized
            .steps
            .iter()
            .all(|s| s.outcome == StepOutcome::Applied)
    );
    assert_eq!(count(&handle, "role").await, 3);
    assert_eq!(count(&handle, "workspace_setting").await, 3);
    assert_eq!(count(&handle, "key_value").await, 1);

    let primary = store.primary_workspace(&handle).await.unwrap();
    assert_eq!(primary, Some(initialized.workspace_id));
}

#[tokio::test]
async fn initialize_twice_converges() {
    let store = store(CapabilitySet::default());
    let (tenant_id, handle) = open_fresh(&store, "acme").await;
    let seed = WorkspaceSeed {
        tenant_id,
        display_name: "Acme".into(),
        admin: Some(admin()),
        external_org_id: None,
        optional_steps: Vec::new(),
    };

    let first = store.initialize(&handle, &seed).await.unwrap();
    let second = store.initialize(&handle, &seed).await.unwrap();

    assert_eq!(first.workspace_id, second.workspace_id);
    assert_eq!(first.admin_linkage, second.admin_linkage);
    assert_eq!(count(&handle, "workspace").await, 1);
    assert_eq!(count(&handle, "role").await, 3);
    assert_eq!(count(&handle, "member").await, 1);
    assert_eq!(count(&handle, "workspace_member").await, 1);
}

#[tokio::test]
async fn unsupported_steps_are_reported_as_skipped() {
    let store = store(CapabilitySet::default());
    let (tenant_id, handle) = open_fresh(&store, "acme").await;
    let seed = WorkspaceSeed {
        tenant_id,
        display_name: "Acme".into(),
        admin: None,
        external_org_id: None,
        optional_steps: vec![OptionalStep::ObjectPermissions],
    };

    let initialized = store.initialize(&handle, &seed).await.unwrap();
    assert!(initialized.admin_linkage.is_none());

    let skipped: Vec<_> = initialized
        .steps
        .iter()
        .filter_map(|s| match &s.outcome {
            StepOutcome::Skipped { reason } => Some((s.step.as_str(), reason.as_str())),
            StepOutcome::Applied => None,
        })
        .collect();
    assert!(skipped.contains(&("object_permissions", "not supported")));
    assert!(skipped.contains(&("admin_user", "no admin supplied")));
    assert_eq!(count(&handle, "object_permission").await, 0);
}

// -----------------------------------------------------------------------
// Membership
// -----------------------------------------------------------------------

#[tokio::test]
async fn ensure_user_matches_by_email() {
    let store = store(CapabilitySet::default());
    let (_, handle) = open_fresh(&store, "acme").await;

    let first = admin();
    let id = store.ensure_user(&handle, &first).await.unwrap();
    assert_eq!(id, first.id);

    let again = DownstreamUser {
        id: Uuid::new_v4(),
        email: "admin@acme.io".into(),
        first_name: None,
        last_name: None,
    };
    assert_eq!(store.ensure_user(&handle, &again).await.unwrap(), first.id);
}

#[tokio::test]
async fn ensure_linkage_is_idempotent() {
    let store = store(CapabilitySet::default());
    let (tenant_id, handle) = open_fresh(&store, "acme").await;
    let seed = WorkspaceSeed {
        tenant_id,
        display_name: "Acme".into(),
        admin: None,
        external_org_id: None,
        optional_steps: Vec::new(),
    };
    let workspace_id = store.initialize(&handle, &seed).await.unwrap().workspace_id;
    let user_id = store.ensure_user(&handle, &admin()).await.unwrap();

    let (a, b) = tokio::join!(
        store.ensure_linkage(&handle, user_id, workspace_id),
        store.ensure_linkage(&handle, user_id, workspace_id),
    );
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(count(&handle, "workspace_member").await, 1);
}

#[tokio::test]
async fn linkage_to_unknown_workspace_fails() {
    let store = store(CapabilitySet::default());
    let (_, handle) = open_fresh(&store, "acme").await;
    let user_id = store.ensure_user(&handle, &admin()).await.unwrap();

    let err = store
        .ensure_linkage(&handle, user_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, PlaneError::LinkageFailure { .. }));
}

#[tokio::test]
async fn empty_store_has_no_primary_workspace() {
    let store = store(CapabilitySet::default());
    let (_, handle) = open_fresh(&store, "acme").await;
    assert!(store.primary_workspace(&handle).await.unwrap().is_none());
}
