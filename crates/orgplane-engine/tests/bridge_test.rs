//! Integration tests for the identity token bridge.

mod common;

use chrono::Utc;
use common::{Harness, first_party_token, setup};
use orgplane_auth::token::{decode_access_token, decode_refresh_token};
use orgplane_core::models::provisioning::{JobOrigin, ProvisionRequest};
use orgplane_core::models::tenant::{CreateTenant, PlanTier, Tenant, TenantStatus};
use orgplane_core::repository::{GlobalUserRepository, TenantRepository};
use serde_json::json;

async fn provision(h: &Harness, org_id: &str, name: &str) -> Tenant {
    h.provisioner
        .provision(
            ProvisionRequest {
                organization_name: name.into(),
                plan: PlanTier::Free,
                admin: None,
                external_org_id: Some(org_id.into()),
            },
            JobOrigin::ExternalEvent,
        )
        .await
        .unwrap()
        .tenant
}

fn credential(sub: &str, org: Option<&str>, email: Option<&str>) -> String {
    let mut claims = json!({
        "sub": sub,
        "role": "org:admin",
        "exp": Utc::now().timestamp() + 600,
    });
    if let Some(org) = org {
        claims["tenant_id"] = json!(org);
    }
    if let Some(email) = email {
        claims["email"] = json!(email);
    }
    first_party_token(claims)
}

// -----------------------------------------------------------------------
// Exchange
// -----------------------------------------------------------------------

#[tokio::test]
async fn exchange_links_user_and_mints_scoped_pair() {
    let h = setup().await;
    let tenant = provision(&h, "org_42", "Acme Inc").await;

    let pair = h
        .bridge()
        .exchange(&credential("user_9", Some("org_42"), Some("Grace@Acme.io")))
        .await
        .unwrap();

    let access = decode_access_token(&pair.access_token, &h.auth).unwrap();
    assert_eq!(access.tenant_id, Some(tenant.id.to_string()));
    assert!(access.workspace_id.is_some());
    assert!(access.user_workspace_id.is_some());
    assert!(pair.refresh_expires_at > pair.access_expires_at);

    let user = h.users.find_by_external_id("user_9").await.unwrap().unwrap();
    assert_eq!(user.email, "grace@acme.io");
    assert_eq!(user.tenant_id, Some(tenant.id));
    assert!(user.last_login_at.is_some());
    assert_eq!(access.user_uuid().unwrap(), user.id);
}

#[tokio::test]
async fn repeated_exchanges_converge_on_one_linkage() {
    let h = setup().await;
    provision(&h, "org_42", "Acme Inc").await;
    let bridge = h.bridge();
    let cred = credential("user_9", Some("org_42"), Some("grace@acme.io"));

    let (a, b) = tokio::join!(bridge.exchange(&cred), bridge.exchange(&cred));
    let a = decode_access_token(&a.unwrap().access_token, &h.auth).unwrap();
    let b = decode_access_token(&b.unwrap().access_token, &h.auth).unwrap();
    assert_eq!(a.user_workspace_id, b.user_workspace_id);

    let c = bridge.exchange(&cred).await.unwrap();
    let c = decode_access_token(&c.access_token, &h.auth).unwrap();
    assert_eq!(a.user_workspace_id, c.user_workspace_id);
}

#[tokio::test]
async fn credential_without_email_uses_placeholder() {
    let h = setup().await;
    provision(&h, "org_42", "Acme Inc").await;

    h.bridge()
        .exchange(&credential("user_9", Some("org_42"), None))
        .await
        .unwrap();

    let user = h.users.find_by_external_id("user_9").await.unwrap().unwrap();
    assert_eq!(user.email, h.auth.placeholder_email("user_9"));
}

#[tokio::test]
async fn tenant_id_is_accepted_as_organization() {
    let h = setup().await;
    let tenant = provision(&h, "org_42", "Acme Inc").await;

    let pair = h
        .bridge()
        .exchange(&credential(
            "user_9",
            Some(&tenant.id.to_string()),
            Some("grace@acme.io"),
        ))
        .await
        .unwrap();
    let access = decode_access_token(&pair.access_token, &h.auth).unwrap();
    assert_eq!(access.tenant_id, Some(tenant.id.to_string()));
}

// -----------------------------------------------------------------------
// Exchange errors
// -----------------------------------------------------------------------

#[tokio::test]
async fn missing_organization_claim() {
    let h = setup().await;
    let err = h
        .bridge()
        .exchange(&credential("user_9", None, Some("grace@acme.io")))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "missing_organization");
}

#[tokio::test]
async fn unknown_or_unfinished_tenant_is_not_provisioned() {
    let h = setup().await;
    let bridge = h.bridge();

    let err = bridge
        .exchange(&credential("user_9", Some("org_404"), None))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "tenant_not_provisioned");

    let tenant = h
        .tenants
        .create(CreateTenant {
            name: "Acme Inc".into(),
            slug: "acme-inc".into(),
            external_org_id: Some("org_42".into()),
            plan: PlanTier::Free,
        })
        .await
        .unwrap();
    h.tenants
        .set_status(tenant.id, TenantStatus::Provisioning)
        .await
        .unwrap();
    h.tenants
        .set_status(tenant.id, TenantStatus::Failed)
        .await
        .unwrap();

    let err = bridge
        .exchange(&credential("user_9", Some("org_42"), None))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "tenant_not_provisioned");
    assert!(h.users.find_by_external_id("user_9").await.unwrap().is_none());
}

#[tokio::test]
async fn forged_or_expired_credentials_fail_authentication() {
    let h = setup().await;
    let bridge = h.bridge();

    let forged = jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &json!({ "sub": "user_9", "tenant_id": "org_42", "exp": Utc::now().timestamp() + 600 }),
        &jsonwebtoken::EncodingKey::from_secret(b"someone-else"),
    )
    .unwrap();
    assert_eq!(
        bridge.exchange(&forged).await.unwrap_err().kind(),
        "authentication_failed"
    );

    let expired = first_party_token(json!({
        "sub": "user_9",
        "tenant_id": "org_42",
        "exp": Utc::now().timestamp() - 3600,
    }));
    assert_eq!(
        bridge.exchange(&expired).await.unwrap_err().kind(),
        "authentication_failed"
    );

    assert_eq!(
        bridge.exchange("not-a-credential").await.unwrap_err().kind(),
        "authentication_failed"
    );
}

// -----------------------------------------------------------------------
// Verify & refresh
// -----------------------------------------------------------------------

#[tokio::test]
async fn verify_inspects_without_side_effects() {
    let h = setup().await;
    let tenant = provision(&h, "org_42", "Acme Inc").await;

    let inspection = h
        .bridge()
        .verify(&credential("user_9", Some("org_42"), Some("grace@acme.io")))
        .await
        .unwrap();

    assert_eq!(inspection.subject, "user_9");
    assert_eq!(inspection.org_role.as_deref(), Some("org:admin"));
    assert_eq!(inspection.user_id, None);
    let resolved = inspection.tenant.unwrap();
    assert_eq!(resolved.id, tenant.id);
    assert!(resolved.workspace_id.is_some());

    assert!(h.users.find_by_external_id("user_9").await.unwrap().is_none());
}

#[tokio::test]
async fn refresh_mints_a_new_pair() {
    let h = setup().await;
    provision(&h, "org_42", "Acme Inc").await;
    let bridge = h.bridge();
    let pair = bridge
        .exchange(&credential("user_9", Some("org_42"), Some("grace@acme.io")))
        .await
        .unwrap();

    let refreshed = bridge.refresh(&pair.refresh_token).await.unwrap();
    let before = decode_access_token(&pair.access_token, &h.auth).unwrap();
    let after = decode_access_token(&refreshed.access_token, &h.auth).unwrap();
    assert_eq!(before.user_workspace_id, after.user_workspace_id);
    assert_ne!(before.jti, after.jti);
    assert!(decode_refresh_token(&refreshed.refresh_token, &h.auth).is_ok());
}

#[tokio::test]
async fn refresh_follows_the_users_current_tenant() {
    let h = setup().await;
    provision(&h, "org_42", "Acme Inc").await;
    let globex = provision(&h, "org_77", "Globex").await;
    let bridge = h.bridge();
    let pair = bridge
        .exchange(&credential("user_9", Some("org_42"), Some("grace@acme.io")))
        .await
        .unwrap();

    let user = h.users.find_by_external_id("user_9").await.unwrap().unwrap();
    let claims = decode_refresh_token(&pair.refresh_token, &h.auth).unwrap();
    assert_eq!(claims.user_uuid().unwrap(), user.id);
    assert_eq!(claims.tenant_id, None);

    h.users
        .update(
            user.id,
            orgplane_core::models::user::UpdateGlobalUser {
                tenant_id: Some(Some(globex.id)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let refreshed = bridge.refresh(&pair.refresh_token).await.unwrap();
    let access = decode_access_token(&refreshed.access_token, &h.auth).unwrap();
    assert_eq!(access.tenant_id, Some(globex.id.to_string()));
    let before = decode_access_token(&pair.access_token, &h.auth).unwrap();
    assert_ne!(access.workspace_id, before.workspace_id);
}

#[tokio::test]
async fn access_tokens_cannot_refresh() {
    let h = setup().await;
    provision(&h, "org_42", "Acme Inc").await;
    let bridge = h.bridge();
    let pair = bridge
        .exchange(&credential("user_9", Some("org_42"), Some("grace@acme.io")))
        .await
        .unwrap();

    let err = bridge.refresh(&pair.access_token).await.unwrap_err();
    assert_eq!(err.kind(), "authentication_failed");
}

#[tokio::test]
async fn unlinked_user_cannot_refresh() {
    let h = setup().await;
    provision(&h, "org_42", "Acme Inc").await;
    let bridge = h.bridge();
    let pair = bridge
        .exchange(&credential("user_9", Some("org_42"), Some("grace@acme.io")))
        .await
        .unwrap();

    let user = h.users.find_by_external_id("user_9").await.unwrap().unwrap();
    h.users
        .update(
            user.id,
            orgplane_core::models::user::UpdateGlobalUser {
                tenant_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = bridge.refresh(&pair.refresh_token).await.unwrap_err();
    assert_eq!(err.kind(), "authentication_failed");
}
