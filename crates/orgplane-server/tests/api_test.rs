//! Route-level tests: the full router over an in-memory registry and
//! embedded tenant stores.

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use http_body_util::BodyExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use orgplane_auth::signature;
use orgplane_server::{AppState, ServerConfig, build_router};
use serde_json::{Value, json};
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
const FIRST_PARTY_SECRET: &str = "first-party-secret";

async fn app() -> Router {
    let mut config = ServerConfig::default();
    config.db.url = "mem://".into();
    config.tenant_store.endpoint = "mem://".into();
    config.auth.downstream_jwt_secret = "downstream-secret".into();
    config.auth.webhook_secret = WEBHOOK_SECRET.into();
    config.auth.fallback_jwt_secret = Some(FIRST_PARTY_SECRET.into());
    config.validate().unwrap();

    let (state, _worker) = AppState::initialize(&config).await.unwrap();
    build_router(state, Duration::from_secs(60))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn signed_webhook(id: &str, body: Value) -> Request<Body> {
    let payload = body.to_string();
    let timestamp = Utc::now().timestamp().to_string();
    let sig = signature::sign(WEBHOOK_SECRET, id, &timestamp, payload.as_bytes()).unwrap();
    Request::post("/api/webhooks/identity")
        .header(header::CONTENT_TYPE, "application/json")
        .header("svix-id", id)
        .header("svix-timestamp", timestamp)
        .header("svix-signature", sig)
        .body(Body::from(payload))
        .unwrap()
}

fn credential(sub: &str, org: &str) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &json!({
            "sub": sub,
            "tenant_id": org,
            "email": format!("{sub}@acme.io"),
            "exp": Utc::now().timestamp() + 600,
        }),
        &EncodingKey::from_secret(FIRST_PARTY_SECRET.as_bytes()),
    )
    .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app().await;
    let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// -----------------------------------------------------------------------
// Registration
// -----------------------------------------------------------------------

#[tokio::test]
async fn registration_creates_then_replays() {
    let app = app().await;
    let request = json!({
        "organization_name": "Acme Inc",
        "admin_email": "ada@acme.io",
        "admin_password": "correct-horse-battery",
        "idempotency_key": "reg-1",
    });

    let (status, first) = send(&app, post_json("/api/auth/register-organization", request.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["success"], true);
    assert_eq!(first["cached"], false);
    assert_eq!(first["slug"], "acme-inc");
    assert_eq!(first["status"], "active");
    assert!(first["access_token"].is_string());

    let (status, second) = send(&app, post_json("/api/auth/register-organization", request)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["cached"], true);
    assert_eq!(second["tenant_id"], first["tenant_id"]);

    let (status, polled) = send(
        &app,
        Request::get("/api/auth/registration-status/reg-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(polled["status"], "completed");
    assert_eq!(polled["result"]["tenant_id"], first["tenant_id"]);
}

#[tokio::test]
async fn invalid_registration_is_a_bad_request() {
    let app = app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/auth/register-organization",
            json!({ "organization_name": "A", "idempotency_key": "reg-x" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn unknown_registration_key_is_not_found() {
    let app = app().await;
    let (status, body) = send(
        &app,
        Request::get("/api/auth/registration-status/never-seen")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

// -----------------------------------------------------------------------
// Webhooks
// -----------------------------------------------------------------------

#[tokio::test]
async fn unsigned_webhook_is_rejected() {
    let app = app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/webhooks/identity",
            json!({ "type": "user.created", "data": {} }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_signature");
}

#[tokio::test]
async fn signed_webhook_is_processed_once() {
    let app = app().await;
    let event = json!({
        "type": "user.created",
        "data": {
            "id": "user_1",
            "email_addresses": [{ "id": "e1", "email_address": "ada@acme.io" }],
            "primary_email_address_id": "e1"
        }
    });

    let (status, first) = send(&app, signed_webhook("msg_1", event.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(first["action"], "user_created");

    let (status, replay) = send(&app, signed_webhook("msg_1", event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["cached"], true);
    assert_eq!(replay["action"], "user_created");
}

// -----------------------------------------------------------------------
// Tokens
// -----------------------------------------------------------------------

#[tokio::test]
async fn exchange_for_unknown_org_is_unauthorized() {
    let app = app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/auth/token",
            json!({ "credential": credential("user_1", "org_missing") }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "tenant_not_provisioned");
}

#[tokio::test]
async fn exchange_and_refresh_after_org_provisioning() {
    let app = app().await;
    let event = json!({
        "type": "organization.created",
        "data": { "id": "org_42", "name": "Acme Inc" }
    });
    let (status, body) = send(&app, signed_webhook("msg_org", event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "provisioning_enqueued");

    // The queue worker provisions in the background.
    let mut pair = Value::Null;
    for _ in 0..200 {
        let (status, body) = send(
            &app,
            post_json(
                "/api/auth/token",
                json!({ "credential": credential("user_9", "org_42") }),
            ),
        )
        .await;
        if status == StatusCode::OK {
            pair = body;
            break;
        }
        assert_eq!(body["error"], "tenant_not_provisioned");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(pair["access_token"].is_string(), "tenant never became active");

    let (status, refreshed) = send(
        &app,
        post_json(
            "/api/auth/refresh",
            json!({ "refresh_token": pair["refresh_token"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(refreshed["access_token"].is_string());
}

#[tokio::test]
async fn verify_requires_bearer_credential() {
    let app = app().await;
    let (status, body) = send(
        &app,
        Request::get("/api/auth/verify").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authentication_failed");

    let (status, body) = send(
        &app,
        Request::get("/api/auth/verify")
            .header(header::AUTHORIZATION, format!("Bearer {}", credential("user_1", "org_1")))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_object());
}
