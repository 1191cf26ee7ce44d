// crates/mesh-gate-mcp/tests/router.rs
// ============================================================================
// Module: Tool Router Tests
// Description: End-to-end router tests over the in-memory stack.
// Purpose: Validate admission, costs, isolation, and audit behavior.
// Dependencies: mesh-gate-mcp, mesh-gate-core, mesh-gate-config, serde_json
// ============================================================================

//! ## Overview
//! Exercises the full gateway assembly: config-provisioned tenants,
//! permission-filtered listings, per-tool quota costs, tenant isolation,
//! and audit/event emission, all against the in-memory backend.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use mesh_gate_config::MeshGateConfig;
use mesh_gate_core::Credentials;
use mesh_gate_core::DispatcherConfig;
use mesh_gate_core::EventPublisher;
use mesh_gate_core::RateLimiter;
use mesh_gate_core::Service;
use mesh_gate_core::TenantId;
use mesh_gate_mcp::GatewayAuditSink;
use mesh_gate_mcp::InMemoryBackend;
use mesh_gate_mcp::NoopMetrics;
use mesh_gate_mcp::RecordingEventBus;
use mesh_gate_mcp::RequestContext;
use mesh_gate_mcp::StaticAuthenticator;
use mesh_gate_mcp::ToolCallAuditEvent;
use mesh_gate_mcp::ToolError;
use mesh_gate_mcp::ToolRouter;
use mesh_gate_mcp::ToolRouterConfig;
use mesh_gate_mcp::WarningAuditEvent;
use serde_json::json;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Gateway configuration with two provisioned tenants.
const CONFIG: &str = r#"
[limiter]
unmetered_services = ["workflows"]

[tiers.small]
kv = { capacity = 2, refill_rate = 1.0 }
events = { capacity = 5, refill_rate = 1.0 }
artifacts = { capacity = 10, refill_rate = 1.0 }

[[tenants]]
tenant_id = "acme"
user_id = "user-1"
org_id = "org-1"
tier = "small"
token = "acme-secret"
scopes = ["kv:*", "events:publish", "workflows:trigger"]

[[tenants]]
tenant_id = "beta"
user_id = "user-2"
tier = "small"
token = "beta-secret"
scopes = ["kv:*"]
"#;

/// Audit sink capturing events for assertions.
#[derive(Default)]
struct RecordingAuditSink {
    /// Captured tool-call events.
    tool_calls: Mutex<Vec<ToolCallAuditEvent>>,
    /// Captured warning events.
    warnings: Mutex<Vec<WarningAuditEvent>>,
}

impl GatewayAuditSink for RecordingAuditSink {
    fn record_tool_call(&self, event: &ToolCallAuditEvent) {
        if let Ok(mut events) = self.tool_calls.lock() {
            events.push(event.clone());
        }
    }

    fn record_warning(&self, event: &WarningAuditEvent) {
        if let Ok(mut events) = self.warnings.lock() {
            events.push(event.clone());
        }
    }
}

/// Assembled gateway fixture.
struct Gateway {
    /// Router under test.
    router: ToolRouter<InMemoryBackend, RecordingEventBus>,
    /// Pipeline event bus.
    bus: RecordingEventBus,
    /// Captured audit events.
    audit: Arc<RecordingAuditSink>,
}

/// Builds the full gateway over the in-memory stack.
fn gateway() -> Gateway {
    let config = MeshGateConfig::parse_str(CONFIG).expect("config");
    let authenticator: Arc<StaticAuthenticator> =
        Arc::new(StaticAuthenticator::from_config(&config).expect("authenticator"));
    let limiter = Arc::new(RateLimiter::with_unmetered(
        config.unmetered_services().expect("unmetered"),
    ));
    let bus = RecordingEventBus::new();
    let audit = Arc::new(RecordingAuditSink::default());
    let router = ToolRouter::new(ToolRouterConfig {
        authenticator,
        limiter,
        backend: InMemoryBackend::new(),
        publisher: EventPublisher::new(bus.clone(), "mesh-gate"),
        dispatch: DispatcherConfig::default(),
        audit: audit.clone(),
        metrics: Arc::new(NoopMetrics),
        max_event_batch: config.dispatch.max_event_batch,
    });
    Gateway {
        router,
        bus,
        audit,
    }
}

/// Request context for the acme tenant.
fn acme() -> RequestContext {
    RequestContext::new(Credentials {
        tenant_id: Some(TenantId::new("acme")),
        user_id: None,
        token: Some("acme-secret".to_string()),
    })
    .with_request_id("req-1")
}

/// Request context for the beta tenant.
fn beta() -> RequestContext {
    RequestContext::new(Credentials {
        token: Some("beta-secret".to_string()),
        ..Credentials::default()
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// kv_set then kv_get round-trips through the full stack.
#[tokio::test]
async fn kv_roundtrip_through_the_router() {
    let gateway = gateway();

    let set = gateway
        .router
        .handle_tool_call(&acme(), "kv_set", json!({"key": "greeting", "value": "hello"}))
        .await
        .expect("kv_set");
    assert_eq!(set["success"], true);

    let get = gateway
        .router
        .handle_tool_call(&acme(), "kv_get", json!({"key": "greeting"}))
        .await
        .expect("kv_get");
    assert_eq!(get["value"], "hello");

    // Every completed call published a tenant-stamped pipeline event.
    let events = gateway.bus.snapshot();
    assert_eq!(events.len(), 2);
    for (event_type, payload) in &events {
        assert_eq!(event_type, "tool_call_completed");
        assert_eq!(payload["tenant_id"], "acme");
        assert_eq!(payload["user_id"], "user-1");
        assert_eq!(payload["context_type"], "organization");
    }

    // The recording bus accepted every publish, so no warnings surfaced.
    let warnings = gateway.audit.warnings.lock().expect("warnings");
    assert!(warnings.is_empty());
}

/// Listings only include tools the context can invoke.
#[tokio::test]
async fn tool_listing_is_permission_filtered() {
    let gateway = gateway();

    let names: Vec<String> = gateway
        .router
        .list_tools(&acme())
        .await
        .expect("list")
        .into_iter()
        .map(|definition| definition.name.to_string())
        .collect();

    assert!(names.contains(&"kv_get".to_string()));
    assert!(names.contains(&"kv_set".to_string()));
    assert!(names.contains(&"events_publish".to_string()));
    assert!(names.contains(&"workflow_trigger".to_string()));
    assert!(!names.contains(&"artifacts_put".to_string()));

    // beta only holds kv scopes.
    let beta_names: Vec<String> = gateway
        .router
        .list_tools(&beta())
        .await
        .expect("list")
        .into_iter()
        .map(|definition| definition.name.to_string())
        .collect();
    assert!(beta_names.iter().all(|name| name.starts_with("kv_")));
}

/// Unknown tools are rejected with the method-not-found code.
#[tokio::test]
async fn unknown_tool_is_rejected() {
    let gateway = gateway();
    let error = gateway
        .router
        .handle_tool_call(&acme(), "no_such_tool", json!({}))
        .await
        .expect_err("unknown tool");
    assert!(matches!(error, ToolError::UnknownTool));
    assert_eq!(error.code(), -32_601);
}

/// Calls outside the granted scopes are forbidden, not throttled.
#[tokio::test]
async fn forbidden_calls_surface_with_the_authz_code() {
    let gateway = gateway();
    let error = gateway
        .router
        .handle_tool_call(
            &acme(),
            "artifacts_put",
            json!({"key": "report", "content": "aGVsbG8="}),
        )
        .await
        .expect_err("forbidden");
    assert!(matches!(error, ToolError::Forbidden(_)));
    assert_eq!(error.code(), -32_000);

    // The artifacts bucket was never created, so no quota was burned.
    assert!(gateway
        .router
        .limiter()
        .tokens_remaining(&TenantId::new("acme"), Service::Artifacts)
        .is_none());
}

/// The third rapid kv call is throttled and carries a retry hint.
#[tokio::test]
async fn rapid_calls_beyond_capacity_are_throttled() {
    let gateway = gateway();

    for _ in 0 .. 2 {
        gateway
            .router
            .handle_tool_call(&acme(), "kv_get", json!({"key": "greeting"}))
            .await
            .expect("within capacity");
    }

    let error = gateway
        .router
        .handle_tool_call(&acme(), "kv_get", json!({"key": "greeting"}))
        .await
        .expect_err("throttled");
    let ToolError::Throttled {
        retry_after,
    } = &error
    else {
        panic!("expected throttle, got {error:?}");
    };
    assert!(retry_after.is_some());
    assert_eq!(error.code(), -32_001);

    // beta's bucket is untouched by acme's exhaustion.
    gateway
        .router
        .handle_tool_call(&beta(), "kv_get", json!({"key": "greeting"}))
        .await
        .expect("beta unaffected");
}

/// Bulk event publishes consume one token per entry.
#[tokio::test]
async fn event_batches_consume_weighted_cost() {
    let gateway = gateway();

    gateway
        .router
        .handle_tool_call(
            &acme(),
            "events_publish",
            json!({"event_type": "deploy", "entries": [{}, {}, {}]}),
        )
        .await
        .expect("publish");

    let remaining = gateway
        .router
        .limiter()
        .tokens_remaining(&TenantId::new("acme"), Service::Events)
        .expect("events bucket");
    assert!((remaining - 2.0).abs() < 1e-9);
}

/// Unmetered services bypass quota but still require permission.
#[tokio::test]
async fn unmetered_services_bypass_quota_only() {
    let gateway = gateway();

    // No workflows tier limit exists; the allow-list admits the calls.
    for _ in 0 .. 20 {
        gateway
            .router
            .handle_tool_call(&acme(), "workflow_trigger", json!({"workflow": "nightly"}))
            .await
            .expect("unmetered trigger");
    }

    // beta lacks the workflows scope entirely.
    let error = gateway
        .router
        .handle_tool_call(&beta(), "workflow_trigger", json!({"workflow": "nightly"}))
        .await
        .expect_err("forbidden");
    assert!(matches!(error, ToolError::Forbidden(_)));
}

/// Invalid tokens surface as unauthenticated with no audit identity.
#[tokio::test]
async fn invalid_tokens_are_unauthenticated() {
    let gateway = gateway();
    let context = RequestContext::new(Credentials {
        token: Some("intruder".to_string()),
        ..Credentials::default()
    });
    let error = gateway
        .router
        .handle_tool_call(&context, "kv_get", json!({"key": "greeting"}))
        .await
        .expect_err("unauthenticated");
    assert!(matches!(error, ToolError::Unauthenticated(_)));
    assert_eq!(error.code(), -32_002);

    let events = gateway.audit.tool_calls.lock().expect("audit");
    let event = events.last().expect("audit event");
    assert_eq!(event.outcome, "denied");
    assert_eq!(event.deny_reason, Some("unauthenticated"));
    assert!(event.tenant_id.is_none());
}

/// Audit records carry identity, outcome, and latency for every call.
#[tokio::test]
async fn audit_records_cover_every_dispatched_call() {
    let gateway = gateway();

    gateway
        .router
        .handle_tool_call(&acme(), "kv_set", json!({"key": "a", "value": "1"}))
        .await
        .expect("kv_set");
    let _ = gateway
        .router
        .handle_tool_call(
            &acme(),
            "artifacts_put",
            json!({"key": "r", "content": "aGk="}),
        )
        .await;

    let events = gateway.audit.tool_calls.lock().expect("audit");
    assert_eq!(events.len(), 2);

    let completed = &events[0];
    assert_eq!(completed.outcome, "completed");
    assert_eq!(completed.tenant_id.as_deref(), Some("acme"));
    assert_eq!(completed.service, Some("kv"));
    assert_eq!(completed.action, Some("write"));
    assert_eq!(completed.request_id.as_deref(), Some("req-1"));
    assert_eq!(completed.attempts, 1);

    let denied = &events[1];
    assert_eq!(denied.outcome, "denied");
    assert_eq!(denied.deny_reason, Some("forbidden"));
    assert_eq!(denied.attempts, 0);
}

/// Idle buckets can be reaped through the router surface.
#[tokio::test]
async fn idle_buckets_are_reaped_through_the_router() {
    let gateway = gateway();
    gateway
        .router
        .handle_tool_call(&acme(), "kv_get", json!({"key": "greeting"}))
        .await
        .expect("kv_get");
    assert_eq!(gateway.router.limiter().bucket_count(), 1);

    gateway.router.evict_idle_buckets(Duration::ZERO);
    assert_eq!(gateway.router.limiter().bucket_count(), 0);
}
