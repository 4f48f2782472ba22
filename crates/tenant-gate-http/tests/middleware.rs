// crates/tenant-gate-http/tests/middleware.rs
// ============================================================================
// Module: HTTP Adapter Tests
// Description: Live-server tests for the tenancy and rate limit middleware.
// Purpose: Validate status mapping, extensions, and trust-boundary keys.
// Dependencies: tenant-gate-http, tenant-gate-core, axum, reqwest, tokio
// ============================================================================

//! ## Overview
//! Each test serves a small axum router on `127.0.0.1:0` with
//! `into_make_service_with_connect_info` and drives it with `reqwest`.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    missing_docs,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;

use axum::Extension;
use axum::Json;
use axum::Router;
use axum::extract::Request;
use axum::middleware::Next;
use axum::middleware::from_fn;
use axum::response::Response;
use axum::routing::get;
use reqwest::StatusCode;
use serde_json::Value;
use serde_json::json;
use tenant_gate_config::AuditSinkKind;
use tenant_gate_config::RateLimitConfig;
use tenant_gate_config::TenantGateConfig;
use tenant_gate_core::ClientIdentity;
use tenant_gate_core::InMemoryTenantDirectory;
use tenant_gate_core::RequestIdentity;
use tenant_gate_core::SharedTenantDirectory;
use tenant_gate_core::TenancyAuditEvent;
use tenant_gate_core::TenancyAuditSink;
use tenant_gate_core::TenantId;
use tenant_gate_core::TenantRecord;
use tenant_gate_core::TenantRequirement;
use tenant_gate_core::TenantSlug;
use tenant_gate_http::CurrentTenant;
use tenant_gate_http::ExtensionIdentityVerifier;
use tenant_gate_http::TenancyHttpError;
use tenant_gate_http::TenancyLayerState;
use tenant_gate_http::protect;
use tokio::net::TcpListener;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

#[derive(Default)]
struct RecordingAuditSink {
    events: Mutex<Vec<TenancyAuditEvent>>,
}

impl RecordingAuditSink {
    fn events(&self) -> Vec<TenancyAuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl TenancyAuditSink for RecordingAuditSink {
    fn record(&self, event: &TenancyAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn id(raw: u64) -> TenantId {
    TenantId::from_raw(raw).expect("nonzero id")
}

fn tenant(raw: u64, slug: &str, domain: Option<&str>) -> TenantRecord {
    TenantRecord {
        id: id(raw),
        slug: TenantSlug::parse(slug).expect("slug"),
        domain: domain.map(str::to_string),
        active: true,
    }
}

fn backend() -> Arc<InMemoryTenantDirectory> {
    let directory = InMemoryTenantDirectory::new();
    directory.upsert_tenant(tenant(1, "main", None)).unwrap();
    directory.upsert_tenant(tenant(5, "acme", Some("acme.example.com"))).unwrap();
    directory.upsert_tenant(tenant(6, "globex", None)).unwrap();
    directory.upsert_tenant(tenant(7, "initech", None)).unwrap();
    directory.put_setting(id(5), "plan", "gold").unwrap();
    directory.put_feature_blob(id(5), r#"["listings"]"#).unwrap();
    Arc::new(directory)
}

fn quiet_config() -> TenantGateConfig {
    let mut config = TenantGateConfig::default();
    config.audit.sink = AuditSinkKind::None;
    config
}

struct TestApp {
    addr: SocketAddr,
    client: reqwest::Client,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn get(&self, path: &str, headers: &[(&str, &str)]) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request.send().await.expect("request")
    }
}

/// Injects a verified identity from a test header, standing in for an
/// upstream authentication layer.
async fn inject_claim(mut request: Request, next: Next) -> Response {
    let claim = request
        .headers()
        .get("x-test-claim")
        .and_then(|value| value.to_str().ok())
        .and_then(TenantId::parse_untrusted);
    if let Some(claim) = claim {
        request.extensions_mut().insert(RequestIdentity::authenticated(Some(claim)));
    }
    next.run(request).await
}

async fn whoami(CurrentTenant(tenant): CurrentTenant) -> Result<Json<Value>, TenancyHttpError> {
    let tenant_id =
        tenant.current_tenant_id().map_err(|_| TenancyHttpError::MissingTenantContext)?;
    let plan = tenant
        .current_tenant_setting("plan")
        .await
        .map_err(|_| TenancyHttpError::MissingTenantContext)?;
    let listings = tenant
        .current_tenant_has_feature("listings")
        .await
        .map_err(|_| TenancyHttpError::MissingTenantContext)?;
    Ok(Json(json!({
        "tenant_id": tenant_id.get(),
        "source": tenant.source().map(|source| source.as_str()),
        "plan": plan,
        "listings": listings,
    })))
}

async fn client_key(Extension(client): Extension<ClientIdentity>) -> String {
    client.key
}

async fn spawn_router(app: Router) -> TestApp {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .expect("serve");
    });
    TestApp {
        addr,
        client: reqwest::Client::new(),
    }
}

async fn spawn_app(state: TenancyLayerState) -> TestApp {
    let routes = Router::new().route("/whoami", get(whoami)).route("/client", get(client_key));
    spawn_router(protect(routes, state).layer(from_fn(inject_claim))).await
}

fn state_with(
    config: &TenantGateConfig,
    directory: &Arc<InMemoryTenantDirectory>,
    verifier: ExtensionIdentityVerifier,
    audit: Arc<RecordingAuditSink>,
) -> TenancyLayerState {
    let shared: SharedTenantDirectory = Arc::clone(directory) as SharedTenantDirectory;
    TenancyLayerState::from_config_with_audit(config, shared, Arc::new(verifier), audit)
        .expect("state")
}

async fn error_body(response: reqwest::Response) -> Value {
    response.json::<Value>().await.expect("json body")
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

#[tokio::test]
async fn domain_request_exposes_tenant_to_handlers() {
    let audit = Arc::new(RecordingAuditSink::default());
    let state = state_with(&quiet_config(), &backend(), ExtensionIdentityVerifier::new(), audit);
    let app = spawn_app(state).await;

    let response = app.get("/whoami", &[("host", "acme.example.com")]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({"tenant_id": 5, "source": "domain", "plan": "gold", "listings": true})
    );
}

#[tokio::test]
async fn header_and_default_resolution() {
    let audit = Arc::new(RecordingAuditSink::default());
    let state = state_with(&quiet_config(), &backend(), ExtensionIdentityVerifier::new(), audit);
    let app = spawn_app(state).await;

    let body: Value = app.get("/whoami", &[("X-Tenant-ID", "6")]).await.json().await.unwrap();
    assert_eq!(body["tenant_id"], 6);
    assert_eq!(body["source"], "header");
    assert_eq!(body["plan"], Value::Null);
    assert_eq!(body["listings"], false);

    let body: Value = app.get("/whoami", &[]).await.json().await.unwrap();
    assert_eq!(body["tenant_id"], 1);
    assert_eq!(body["source"], "default");
}

#[tokio::test]
async fn path_slug_resolution_uses_first_segment() {
    let audit = Arc::new(RecordingAuditSink::default());
    let state = state_with(&quiet_config(), &backend(), ExtensionIdentityVerifier::new(), audit);
    let routes = Router::new().route("/{tenant}/whoami", get(whoami));
    let app = spawn_router(protect(routes, state)).await;

    let body: Value = app.get("/globex/whoami", &[]).await.json().await.unwrap();
    assert_eq!(body["tenant_id"], 6);
    assert_eq!(body["source"], "path_slug");
}

// ============================================================================
// SECTION: Rejections
// ============================================================================

#[tokio::test]
async fn conflict_is_forbidden_with_generic_body_and_audited() {
    let audit = Arc::new(RecordingAuditSink::default());
    let state = state_with(
        &quiet_config(),
        &backend(),
        ExtensionIdentityVerifier::new(),
        Arc::clone(&audit),
    );
    let app = spawn_app(state).await;

    let response = app.get("/whoami", &[("X-Tenant-ID", "6"), ("x-test-claim", "7")]).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        error_body(response).await,
        json!({"error": {"kind": "tenant_conflict", "message": "access denied"}})
    );

    let events = audit.events();
    let conflict = events.iter().find(|event| event.reason == "tenant_conflict").expect("event");
    assert_eq!(conflict.header_tenant_id, Some(id(6)));
    assert_eq!(conflict.claim_tenant_id, Some(id(7)));
}

#[tokio::test]
async fn matching_claim_and_header_pass() {
    let audit = Arc::new(RecordingAuditSink::default());
    let state = state_with(&quiet_config(), &backend(), ExtensionIdentityVerifier::new(), audit);
    let app = spawn_app(state).await;

    let response = app.get("/whoami", &[("X-Tenant-ID", "7"), ("x-test-claim", "7")]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = error_body(response).await;
    assert_eq!(body["tenant_id"], 7);

    let body: Value = app.get("/whoami", &[("x-test-claim", "6")]).await.json().await.unwrap();
    assert_eq!(body["tenant_id"], 6);
    assert_eq!(body["source"], "claim");
}

#[tokio::test]
async fn missing_identity_is_unauthorized_when_required() {
    let audit = Arc::new(RecordingAuditSink::default());
    let state =
        state_with(&quiet_config(), &backend(), ExtensionIdentityVerifier::required(), audit);
    let app = spawn_app(state).await;

    let response = app.get("/whoami", &[]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_body(response).await["error"]["kind"], "unauthenticated");

    let response = app.get("/whoami", &[("x-test-claim", "5")]).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn directory_outage_is_service_unavailable() {
    let directory = backend();
    directory.set_unavailable(true);
    let audit = Arc::new(RecordingAuditSink::default());
    let state =
        state_with(&quiet_config(), &directory, ExtensionIdentityVerifier::new(), audit);
    let app = spawn_app(state).await;

    let response = app.get("/whoami", &[("X-Tenant-ID", "6")]).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        error_body(response).await,
        json!({"error": {"kind": "directory_unavailable", "message": "service unavailable"}})
    );
}

#[tokio::test]
async fn explicit_requirement_rejects_default_tenant() {
    let audit = Arc::new(RecordingAuditSink::default());
    let state = state_with(&quiet_config(), &backend(), ExtensionIdentityVerifier::new(), audit)
        .with_requirement(TenantRequirement::Explicit);
    let app = spawn_app(state).await;

    let response = app.get("/whoami", &[]).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_body(response).await["error"]["kind"], "tenant_required");

    let response = app.get("/whoami", &[("X-Tenant-ID", "6")]).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn handler_without_tenancy_layer_is_internal_error() {
    let app = spawn_router(Router::new().route("/whoami", get(whoami))).await;
    let response = app.get("/whoami", &[]).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_body(response).await["error"]["kind"], "internal");
}

// ============================================================================
// SECTION: Trust Boundary and Abuse Control
// ============================================================================

#[tokio::test]
async fn forwarded_header_only_honored_from_trusted_proxy() {
    let audit = Arc::new(RecordingAuditSink::default());
    let untrusted =
        state_with(&quiet_config(), &backend(), ExtensionIdentityVerifier::new(), audit.clone());
    let app = spawn_app(untrusted).await;
    let key = app.get("/client", &[("X-Forwarded-For", "203.0.113.9")]).await.text().await;
    assert_eq!(key.unwrap(), "127.0.0.1");

    let mut config = quiet_config();
    config.trust.trusted_proxies = vec!["127.0.0.0/8".to_string()];
    let trusted = state_with(&config, &backend(), ExtensionIdentityVerifier::new(), audit);
    let app = spawn_app(trusted).await;
    let key = app
        .get("/client", &[("X-Forwarded-For", "203.0.113.9, 10.1.1.1")])
        .await
        .text()
        .await;
    assert_eq!(key.unwrap(), "203.0.113.9");
}

#[tokio::test]
async fn rate_limit_returns_429_with_retry_after() {
    let mut config = quiet_config();
    config.limits.rate_limit = Some(RateLimitConfig {
        max_requests: 2,
        window_ms: 60_000,
        max_entries: 16,
    });
    let audit = Arc::new(RecordingAuditSink::default());
    let state = state_with(&config, &backend(), ExtensionIdentityVerifier::new(), audit);
    let app = spawn_app(state).await;

    assert_eq!(app.get("/whoami", &[]).await.status(), StatusCode::OK);
    assert_eq!(app.get("/whoami", &[]).await.status(), StatusCode::OK);
    let response = app.get("/whoami", &[]).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .expect("retry-after");
    assert!((1 ..= 60).contains(&retry_after));
    assert_eq!(error_body(response).await["error"]["kind"], "rate_limited");
}

#[tokio::test]
async fn rate_limit_covers_rejected_requests() {
    let mut config = quiet_config();
    config.limits.rate_limit = Some(RateLimitConfig {
        max_requests: 1,
        window_ms: 60_000,
        max_entries: 16,
    });
    let audit = Arc::new(RecordingAuditSink::default());
    let state = state_with(&config, &backend(), ExtensionIdentityVerifier::required(), audit);
    let app = spawn_app(state).await;

    assert_eq!(app.get("/whoami", &[]).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.get("/whoami", &[]).await.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn rate_limit_partitions_by_forwarded_client_behind_trusted_proxy() {
    let mut config = quiet_config();
    config.trust.trusted_proxies = vec!["127.0.0.1".to_string()];
    config.limits.rate_limit = Some(RateLimitConfig {
        max_requests: 1,
        window_ms: 60_000,
        max_entries: 16,
    });
    let audit = Arc::new(RecordingAuditSink::default());
    let state = state_with(&config, &backend(), ExtensionIdentityVerifier::new(), audit);
    let app = spawn_app(state).await;

    let first = [("X-Forwarded-For", "198.51.100.1")];
    let second = [("X-Forwarded-For", "198.51.100.2")];
    assert_eq!(app.get("/whoami", &first).await.status(), StatusCode::OK);
    assert_eq!(app.get("/whoami", &second).await.status(), StatusCode::OK);
    assert_eq!(app.get("/whoami", &first).await.status(), StatusCode::TOO_MANY_REQUESTS);
}

// ============================================================================
// SECTION: Setup
// ============================================================================

#[tokio::test]
async fn file_audit_sink_from_config_records_decisions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tenancy-audit.jsonl");
    let mut config = TenantGateConfig::default();
    config.audit.sink = AuditSinkKind::File;
    config.audit.path = Some(path.display().to_string());

    let directory: SharedTenantDirectory = backend();
    let state = TenancyLayerState::from_config(
        &config,
        directory,
        Arc::new(ExtensionIdentityVerifier::new()),
    )
    .unwrap();
    let app = spawn_app(state).await;
    assert_eq!(app.get("/whoami", &[("X-Tenant-ID", "6")]).await.status(), StatusCode::OK);

    let contents = std::fs::read_to_string(&path).unwrap();
    let line = contents.lines().next().expect("audit line");
    let event: Value = serde_json::from_str(line).unwrap();
    assert_eq!(event["event"], "tenancy_decision");
    assert_eq!(event["decision"], "allowed");
    assert_eq!(event["tenant_id"], 6);
}

#[test]
fn invalid_config_fails_setup() {
    let mut config = quiet_config();
    config.tenancy.default_tenant_id = 0;
    let directory: SharedTenantDirectory = backend();
    let result = TenancyLayerState::from_config(
        &config,
        directory,
        Arc::new(ExtensionIdentityVerifier::new()),
    );
    assert!(result.is_err());
}
