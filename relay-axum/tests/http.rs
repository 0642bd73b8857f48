use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use http_body_util::BodyExt;
use relay_context::RelayContext;
use relay_core::upstream::memory::{MemoryInboxConnector, MemoryTransportFactory};
use chrono::{DateTime, Utc};
use relay_core::{
    EmailLog, InboxConfig, InboxMessage, LimitsTable, MemoryStore, MetadataStore, OutboundConfig,
    PlanLimits, PlanTier, RelaySettings, Tenant, TenantId,
};
use relay_axum::RelayApp;
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    app: RelayApp,
    relay: MemoryTransportFactory,
    inbox: MemoryInboxConnector,
}

fn outbound() -> OutboundConfig {
    OutboundConfig {
        host: "smtp.example.com".into(),
        port: 587,
        secure: false,
        user: "relay@example.com".into(),
        password: "hunter2".into(),
        from_name: Some("Acme".into()),
    }
}

fn inbox() -> InboxConfig {
    InboxConfig {
        host: "imap.example.com".into(),
        port: 993,
        secure: true,
        user: "reader@example.com".into(),
        password: "hunter2".into(),
    }
}

fn tenants() -> Vec<Tenant> {
    let mut exhausted = Tenant::new("exhausted", PlanTier::Free).with_outbound(outbound());
    exhausted.emails_sent_this_month = 3000;
    vec![
        Tenant::new("free", PlanTier::Free)
            .with_outbound(outbound())
            .with_inbox(inbox()),
        Tenant::new("premium", PlanTier::Premium).with_outbound(outbound()),
        Tenant::new("no-inbox", PlanTier::Free),
        exhausted,
    ]
}

fn test_app_with(limits: LimitsTable, store: Arc<dyn MetadataStore>) -> TestApp {
    test_app_configured(RelaySettings::default(), limits, store)
}

fn test_app_configured(
    settings: RelaySettings,
    limits: LimitsTable,
    store: Arc<dyn MetadataStore>,
) -> TestApp {
    let relay = MemoryTransportFactory::new();
    let inbox = MemoryInboxConnector::new();
    let ctx = RelayContext::builder(settings)
        .limits(limits)
        .store(store)
        .transports(Arc::new(relay.clone()))
        .inbox_connector(Arc::new(inbox.clone()))
        .build()
        .unwrap();
    TestApp {
        app: relay_axum::build(Arc::new(ctx)),
        relay,
        inbox,
    }
}

fn test_app() -> TestApp {
    test_app_with(
        LimitsTable::default(),
        Arc::new(MemoryStore::with_tenants(tenants())),
    )
}

fn get(uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut req = Request::builder().method("GET").uri(uri);
    if let Some(key) = api_key {
        req = req.header("x-api-key", key);
    }
    req.body(Body::empty()).unwrap()
}

fn post(uri: &str, api_key: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-api-key", api_key)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn email() -> Value {
    json!({ "to": "someone@example.com", "subject": "hi", "html": "<p>hello</p>" })
}

async fn json_body(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_healthy_store_and_sets_request_id() {
    let t = test_app();

    let res = t.app.router.clone().oneshot(get("/health", None)).await.unwrap();

    assert_eq!(res.status().as_u16(), 200);
    assert!(res.headers().get("x-request-id").is_some());
    let body = json_body(res).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["status"], "connected");
    assert!(body["cache"]["hits"].is_number());
}

#[tokio::test]
async fn request_id_is_preserved_when_provided() {
    let t = test_app();
    let mut req = get("/health", None);
    req.headers_mut()
        .insert("x-request-id", HeaderValue::from_static("req-test-123"));

    let res = t.app.router.clone().oneshot(req).await.unwrap();

    assert_eq!(res.headers()["x-request-id"], "req-test-123");
}

#[tokio::test]
async fn missing_api_key_is_not_authenticated() {
    let t = test_app();

    let res = t.app.router.clone().oneshot(get("/config", None)).await.unwrap();

    assert_eq!(res.status().as_u16(), 401);
    let body = json_body(res).await;
    assert_eq!(body["name"], "NotAuthenticated");
    assert_eq!(body["className"], "not-authenticated");
}

#[tokio::test]
async fn unknown_tenant_is_not_found() {
    let t = test_app();

    let res = t
        .app
        .router
        .clone()
        .oneshot(get("/config", Some("nobody")))
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 404);
    assert_eq!(json_body(res).await["name"], "NotFound");
}

#[tokio::test]
async fn config_never_exposes_passwords() {
    let t = test_app();

    let res = t
        .app
        .router
        .clone()
        .oneshot(get("/config", Some("free")))
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 200);
    let body = json_body(res).await;
    assert_eq!(body["user"]["plan"], "free");
    assert_eq!(body["outbound"]["host"], "smtp.example.com");
    assert!(body["outbound"].get("password").is_none());
    assert!(body["inbox"].get("password").is_none());
    assert_eq!(body["limits"]["concurrentRequests"], 5);
}

#[tokio::test]
async fn send_email_relays_and_reports_usage() {
    let t = test_app();

    let res = t
        .app
        .router
        .clone()
        .oneshot(post("/send-email", "free", email()))
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 200);
    let body = json_body(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["emails_sent"], 1);
    assert_eq!(t.relay.sent().len(), 1);
    assert_eq!(t.relay.sent()[0].message.to, "someone@example.com");

    let res = t
        .app
        .router
        .clone()
        .oneshot(post("/send-email", "premium", email()))
        .await
        .unwrap();
    assert_eq!(json_body(res).await["user"]["emails_sent"], "unlimited");

    // Same relay parameters, one pooled transport.
    assert_eq!(t.relay.builds(), 1);
}

#[tokio::test]
async fn send_email_requires_fields() {
    let t = test_app();

    let res = t
        .app
        .router
        .clone()
        .oneshot(post("/send-email", "free", json!({ "to": "x@example.com" })))
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 400);
    let body = json_body(res).await;
    assert_eq!(body["name"], "BadRequest");
    assert_eq!(body["message"], "Missing required fields: to, subject, html");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let t = test_app();
    let req = Request::builder()
        .method("POST")
        .uri("/send-email")
        .header("x-api-key", "free")
        .header("content-type", "application/json")
        .body(Body::from("{\"to\":"))
        .unwrap();

    let res = t.app.router.clone().oneshot(req).await.unwrap();

    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(json_body(res).await["code"], 400);
}

#[tokio::test]
async fn exhausted_monthly_quota_is_429() {
    let t = test_app();

    let res = t
        .app
        .router
        .clone()
        .oneshot(post("/send-email", "exhausted", email()))
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 429);
    let body = json_body(res).await;
    assert_eq!(body["name"], "TooManyRequests");
    assert_eq!(body["data"]["limit"], 3000);
    assert!(t.relay.sent().is_empty());
}

#[tokio::test]
async fn hourly_quota_denial_carries_retry_after() {
    let limits = LimitsTable::default().with_limits(
        PlanTier::Free,
        PlanLimits {
            requests_per_hour: 1,
            ..PlanLimits::FREE
        },
    );
    let t = test_app_with(limits, Arc::new(MemoryStore::with_tenants(tenants())));

    let first = t
        .app
        .router
        .clone()
        .oneshot(post("/send-email", "free", email()))
        .await
        .unwrap();
    assert_eq!(first.status().as_u16(), 200);

    let second = t
        .app
        .router
        .clone()
        .oneshot(post("/send-email", "free", email()))
        .await
        .unwrap();

    assert_eq!(second.status().as_u16(), 429);
    let retry_after: u64 = second.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=3600).contains(&retry_after));
    let body = json_body(second).await;
    assert_eq!(body["data"]["reason"], "hourly_rate_exceeded");
    assert_eq!(body["data"]["retryAfter"], retry_after);
    assert_eq!(t.relay.sent().len(), 1);

    // Permits from both requests were released.
    assert_eq!(t.app.ctx.admission().in_flight(&TenantId::new("free")), 0);
}

#[tokio::test]
async fn read_messages_is_cached_until_mark_read() {
    let t = test_app();
    t.inbox.deliver(
        "reader@example.com",
        "INBOX",
        InboxMessage {
            id: "m-1".into(),
            from: "a@example.com".into(),
            subject: "hello".into(),
            date: "2026-10-01T00:00:00Z".into(),
            seen: false,
            preview: None,
        },
    );

    let first = t
        .app
        .router
        .clone()
        .oneshot(get("/read-messages?limit=10", Some("free")))
        .await
        .unwrap();
    assert_eq!(first.status().as_u16(), 200);
    let first = json_body(first).await;
    assert_eq!(first["cached"], false);
    assert_eq!(first["count"], 1);
    assert_eq!(first["messages"][0]["seen"], false);

    let second = t
        .app
        .router
        .clone()
        .oneshot(get("/read-messages?limit=10", Some("free")))
        .await
        .unwrap();
    assert_eq!(json_body(second).await["cached"], true);

    let marked = t
        .app
        .router
        .clone()
        .oneshot(post("/mark-read", "free", json!({ "messageId": "m-1" })))
        .await
        .unwrap();
    assert_eq!(marked.status().as_u16(), 200);

    let third = t
        .app
        .router
        .clone()
        .oneshot(get("/read-messages?limit=10", Some("free")))
        .await
        .unwrap();
    let third = json_body(third).await;
    assert_eq!(third["cached"], false);
    assert_eq!(third["messages"][0]["seen"], true);
    assert_eq!(t.inbox.list_calls(), 2);
}

#[tokio::test]
async fn read_messages_without_inbox_is_bad_request() {
    let t = test_app();

    let res = t
        .app
        .router
        .clone()
        .oneshot(get("/read-messages", Some("no-inbox")))
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(
        json_body(res).await["message"],
        "inbox not configured for this tenant"
    );
    assert_eq!(t.app.ctx.admission().hourly_count(&TenantId::new("no-inbox")), 0);
}

#[tokio::test]
async fn relay_failure_is_bad_gateway_and_counted() {
    let t = test_app();
    t.relay.fail_sends(true);

    let res = t
        .app
        .router
        .clone()
        .oneshot(post("/send-email", "free", email()))
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 502);
    let body = json_body(res).await;
    assert!(body["message"].as_str().unwrap().starts_with("550"));
    assert_eq!(t.app.state.metrics.errors(), 1);
    assert_eq!(t.app.ctx.admission().in_flight(&TenantId::new("free")), 0);
}

struct DownStore;

#[async_trait::async_trait]
impl MetadataStore for DownStore {
    async fn fetch_tenant(&self, _id: &TenantId) -> anyhow::Result<Option<Tenant>> {
        anyhow::bail!("connection refused")
    }

    async fn record_send(&self, _id: &TenantId) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }

    async fn record_read(&self, _id: &TenantId) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }

    async fn update_tenant(&self, _tenant: Tenant) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }

    async fn list_tenants(&self) -> anyhow::Result<Vec<Tenant>> {
        anyhow::bail!("connection refused")
    }

    async fn log_email(&self, _entry: EmailLog) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }

    async fn email_logs_since(
        &self,
        _since: DateTime<Utc>,
        _limit: usize,
    ) -> anyhow::Result<Vec<EmailLog>> {
        anyhow::bail!("connection refused")
    }

    async fn ping(&self) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }
}

#[tokio::test]
async fn unreachable_store_degrades_health() {
    let t = test_app_with(LimitsTable::default(), Arc::new(DownStore));

    let res = t.app.router.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(res.status().as_u16(), 503);
    let body = json_body(res).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"]["status"], "error");

    let res = t
        .app
        .router
        .clone()
        .oneshot(get("/config", Some("free")))
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 503);
    assert_eq!(json_body(res).await["name"], "Unavailable");
}

fn admin_app() -> TestApp {
    let settings = RelaySettings {
        admin_key: Some("ops-secret".into()),
        ..RelaySettings::default()
    };
    test_app_configured(
        settings,
        LimitsTable::default(),
        Arc::new(MemoryStore::with_tenants(tenants())),
    )
}

fn admin_get(admin_key: Option<&str>) -> Request<Body> {
    let mut req = Request::builder().method("GET").uri("/metrics");
    if let Some(key) = admin_key {
        req = req.header("x-admin-key", key);
    }
    req.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn usage_report_requires_the_admin_key() {
    let t = admin_app();

    for key in [None, Some("wrong"), Some("")] {
        let res = t.app.router.clone().oneshot(admin_get(key)).await.unwrap();
        assert_eq!(res.status().as_u16(), 401);
        assert_eq!(json_body(res).await["name"], "NotAuthenticated");
    }

    // A tenant api key is not an admin key.
    let res = t
        .app
        .router
        .clone()
        .oneshot(get("/metrics", Some("premium")))
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 401);
}

#[tokio::test]
async fn usage_report_is_disabled_without_a_configured_key() {
    let t = test_app();

    let res = t.app.router.clone().oneshot(admin_get(Some(""))).await.unwrap();
    assert_eq!(res.status().as_u16(), 401);
}

#[tokio::test]
async fn usage_report_aggregates_tenants_and_activity() {
    let t = admin_app();
    let res = t
        .app
        .router
        .clone()
        .oneshot(post("/send-email", "premium", email()))
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);

    for _ in 0..50 {
        let res = t
            .app
            .router
            .clone()
            .oneshot(admin_get(Some("ops-secret")))
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 200);
        assert_eq!(res.headers()["cache-control"], "private, max-age=60");
        let body = json_body(res).await;

        if body["emails"]["totalSent"] == 1 && body["emails"]["last24Hours"] == 1 {
            assert_eq!(body["users"], json!({ "total": 4, "free": 3, "premium": 1 }));
            assert_eq!(body["emails"]["sentThisMonth"], 3001);
            assert_eq!(body["emails"]["successRate"], 100.0);
            assert_eq!(body["topSenders"][0]["plan"], "premium");
            assert!(body["topSenders"][0].get("id").is_none());
            assert!(body["uptimeSecs"].is_number());
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("usage report never reflected the send");
}
