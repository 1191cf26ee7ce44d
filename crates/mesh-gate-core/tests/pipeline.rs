// crates/mesh-gate-core/tests/pipeline.rs
// ============================================================================
// Module: Pipeline Tests
// Description: Tests for the dispatch pipeline with in-memory fixtures.
// Purpose: Validate check ordering, retry bounds, and event emission.
// Dependencies: mesh-gate-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! Exercises the dispatcher state machine end to end with stub
//! collaborators: permission denials must not burn quota, transient
//! failures are retried a bounded number of times, timeouts count as
//! transient without refunding tokens, and publish failures never fail an
//! otherwise-successful request.

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

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use mesh_gate_core::Action;
use mesh_gate_core::AuthError;
use mesh_gate_core::Authenticator;
use mesh_gate_core::BackendConnector;
use mesh_gate_core::BackendError;
use mesh_gate_core::BackendRequest;
use mesh_gate_core::ContextType;
use mesh_gate_core::Credentials;
use mesh_gate_core::DenyReason;
use mesh_gate_core::Dispatcher;
use mesh_gate_core::DispatcherConfig;
use mesh_gate_core::EventBusClient;
use mesh_gate_core::EventPublisher;
use mesh_gate_core::Permission;
use mesh_gate_core::PermissionSet;
use mesh_gate_core::PublishError;
use mesh_gate_core::RateLimiter;
use mesh_gate_core::RequestOutcome;
use mesh_gate_core::ResourceLimits;
use mesh_gate_core::RetryPolicy;
use mesh_gate_core::Service;
use mesh_gate_core::ServiceLimit;
use mesh_gate_core::TenantContext;
use mesh_gate_core::TenantId;
use mesh_gate_core::ToolCallRequest;
use mesh_gate_core::UserId;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Authenticator resolving a fixed tenant context.
struct StubAuthenticator {
    /// Context returned for every resolve call.
    context: TenantContext,
}

#[async_trait]
impl Authenticator for StubAuthenticator {
    async fn resolve(&self, credentials: &Credentials) -> Result<TenantContext, AuthError> {
        if credentials.token.as_deref() == Some("valid") {
            Ok(self.context.clone())
        } else {
            Err(AuthError::InvalidCredentials("bad token".to_string()))
        }
    }
}

/// Backend returning a scripted sequence of results.
struct ScriptedBackend {
    /// Invocations observed so far.
    calls: Arc<AtomicUsize>,
    /// Result script; the last entry repeats when exhausted.
    script: Vec<Result<Value, BackendError>>,
}

#[async_trait]
impl BackendConnector for ScriptedBackend {
    async fn invoke(
        &self,
        _request: &BackendRequest,
        _deadline: Duration,
    ) -> Result<Value, BackendError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.get(index).unwrap_or_else(|| self.script.last().expect("script")).clone()
    }
}

/// Backend that never completes within any deadline.
struct HangingBackend;

#[async_trait]
impl BackendConnector for HangingBackend {
    async fn invoke(
        &self,
        _request: &BackendRequest,
        _deadline: Duration,
    ) -> Result<Value, BackendError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Value::Null)
    }
}

/// Event bus recording published events, optionally failing.
#[derive(Default, Clone)]
struct RecordingBus {
    /// Captured `(event_type, payload)` pairs.
    events: Arc<Mutex<Vec<(String, Value)>>>,
    /// When true, every publish fails.
    fail: bool,
}

#[async_trait]
impl EventBusClient for RecordingBus {
    async fn publish(&self, event_type: &str, payload: Value) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Bus("bus unavailable".to_string()));
        }
        if let Ok(mut events) = self.events.lock() {
            events.push((event_type.to_string(), payload));
        }
        Ok(())
    }
}

/// Builds a context for tenant `acme` with kv capacity 5 at 1 token/sec.
fn acme_context() -> TenantContext {
    let mut limits = BTreeMap::new();
    limits.insert(Service::Kv, ServiceLimit::new(5.0, 1.0).expect("limit"));
    TenantContext::new(
        TenantId::new("acme"),
        UserId::new("user-1"),
        ContextType::Personal,
        PermissionSet::from_grants([Permission::wildcard(Service::Kv)]),
        ResourceLimits::new(limits),
    )
}

/// Builds a kv write tool call with unit cost.
fn kv_write_request() -> ToolCallRequest {
    ToolCallRequest {
        request_id: None,
        tool: "kv_set".to_string(),
        service: Service::Kv,
        action: Action::Write,
        cost: 1.0,
        params: json!({"key": "greeting", "value": "hello"}),
    }
}

/// Builds a retry policy with no delays so tests run instantly.
fn instant_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::ZERO, Duration::ZERO, 0.0).expect("policy")
}

/// Builds a dispatcher over the given backend and bus.
fn dispatcher<B: BackendConnector>(
    backend: B,
    bus: RecordingBus,
    config: DispatcherConfig,
) -> Dispatcher<StubAuthenticator, B, RecordingBus> {
    Dispatcher::new(
        StubAuthenticator {
            context: acme_context(),
        },
        Arc::new(RateLimiter::new()),
        backend,
        EventPublisher::new(bus, "mesh-gate-test"),
        config,
    )
}

/// Credentials accepted by the stub authenticator.
fn valid_credentials() -> Credentials {
    Credentials {
        tenant_id: Some(TenantId::new("acme")),
        user_id: Some(UserId::new("user-1")),
        token: Some("valid".to_string()),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// A successful call completes, consumes one token, and emits one event.
#[tokio::test]
async fn successful_call_completes_and_emits_one_event() {
    let bus = RecordingBus::default();
    let backend = ScriptedBackend {
        calls: Arc::new(AtomicUsize::new(0)),
        script: vec![Ok(json!({"ok": true}))],
    };
    let dispatcher = dispatcher(backend, bus.clone(), DispatcherConfig::default());

    let result = dispatcher.dispatch(&valid_credentials(), kv_write_request()).await;

    assert!(matches!(result.outcome, RequestOutcome::Allowed(_)));
    assert_eq!(result.attempts, 1);
    assert!(result.publish_error.is_none());

    let remaining = dispatcher
        .limiter()
        .tokens_remaining(&TenantId::new("acme"), Service::Kv)
        .expect("bucket exists");
    assert!((remaining - 4.0).abs() < 1e-9);

    let events = bus.events.lock().expect("events");
    assert_eq!(events.len(), 1);
    let (event_type, payload) = &events[0];
    assert_eq!(event_type, "tool_call_completed");
    assert_eq!(payload["tenant_id"], "acme");
    assert_eq!(payload["outcome"], "completed");
}

/// Invalid credentials deny as unauthenticated without touching quota.
#[tokio::test]
async fn unauthenticated_call_is_terminal() {
    let bus = RecordingBus::default();
    let backend = ScriptedBackend {
        calls: Arc::new(AtomicUsize::new(0)),
        script: vec![Ok(Value::Null)],
    };
    let dispatcher = dispatcher(backend, bus.clone(), DispatcherConfig::default());

    let credentials = Credentials {
        token: Some("wrong".to_string()),
        ..Credentials::default()
    };
    let result = dispatcher.dispatch(&credentials, kv_write_request()).await;

    assert!(matches!(
        result.outcome,
        RequestOutcome::Denied(DenyReason::Unauthenticated(_))
    ));
    assert_eq!(result.attempts, 0);
    assert!(result.tenant_id.is_none());
    assert!(dispatcher.limiter().tokens_remaining(&TenantId::new("acme"), Service::Kv).is_none());
}

/// A forbidden call is rejected before any bucket is touched.
#[tokio::test]
async fn forbidden_call_never_burns_quota() {
    let bus = RecordingBus::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = ScriptedBackend {
        calls: calls.clone(),
        script: vec![Ok(Value::Null)],
    };
    let dispatcher = dispatcher(backend, bus.clone(), DispatcherConfig::default());

    // Warm the kv bucket so a token count exists to compare against.
    let _ = dispatcher.dispatch(&valid_credentials(), kv_write_request()).await;
    let before = dispatcher
        .limiter()
        .tokens_remaining(&TenantId::new("acme"), Service::Kv)
        .expect("bucket exists");

    // acme holds kv:* but nothing on events.
    let request = ToolCallRequest {
        request_id: None,
        tool: "events_publish".to_string(),
        service: Service::Events,
        action: Action::Publish,
        cost: 1.0,
        params: json!({"entries": []}),
    };
    let result = dispatcher.dispatch(&valid_credentials(), request).await;

    assert!(matches!(result.outcome, RequestOutcome::Denied(DenyReason::Forbidden(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "backend not invoked for forbidden call");
    // No events bucket was created and the kv bucket is untouched.
    assert!(
        dispatcher.limiter().tokens_remaining(&TenantId::new("acme"), Service::Events).is_none()
    );
    let after = dispatcher
        .limiter()
        .tokens_remaining(&TenantId::new("acme"), Service::Kv)
        .expect("bucket exists");
    assert!((before - after).abs() < f64::EPSILON);

    let events = bus.events.lock().expect("events");
    let (_, payload) = events.last().expect("denied event");
    assert_eq!(payload["deny_reason"], "forbidden");
}

/// The sixth rapid call is throttled with a one-second retry hint.
#[tokio::test]
async fn sixth_rapid_call_is_throttled() {
    let bus = RecordingBus::default();
    let backend = ScriptedBackend {
        calls: Arc::new(AtomicUsize::new(0)),
        script: vec![Ok(Value::Null)],
    };
    let dispatcher = dispatcher(backend, bus, DispatcherConfig::default());

    for _ in 0 .. 5 {
        let result = dispatcher.dispatch(&valid_credentials(), kv_write_request()).await;
        assert!(matches!(result.outcome, RequestOutcome::Allowed(_)));
    }

    let result = dispatcher.dispatch(&valid_credentials(), kv_write_request()).await;
    let RequestOutcome::Denied(reason) = &result.outcome else {
        panic!("expected throttle denial, got {:?}", result.outcome);
    };
    let retry_after = reason.retry_after().expect("retryable throttle");
    // Allow a little slack for elapsed wall-clock refill between calls.
    assert!(retry_after.as_secs_f64() > 0.9);
    assert!(retry_after.as_secs_f64() <= 1.0);
}

/// An always-transient backend is retried exactly N times then fails.
#[tokio::test]
async fn retries_are_bounded() {
    let bus = RecordingBus::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = ScriptedBackend {
        calls: calls.clone(),
        script: vec![Err(BackendError::Transient("upstream throttled".to_string()))],
    };
    let config = DispatcherConfig {
        retry: instant_retry(3),
        backend_deadline: Duration::from_secs(10),
    };
    let dispatcher = dispatcher(backend, bus, config);

    let result = dispatcher.dispatch(&valid_credentials(), kv_write_request()).await;

    assert!(matches!(result.outcome, RequestOutcome::Failed(BackendError::Transient(_))));
    assert_eq!(result.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// A transient failure that recovers mid-budget completes.
#[tokio::test]
async fn transient_failure_recovers_within_budget() {
    let bus = RecordingBus::default();
    let backend = ScriptedBackend {
        calls: Arc::new(AtomicUsize::new(0)),
        script: vec![
            Err(BackendError::Transient("timeout".to_string())),
            Ok(json!({"ok": true})),
        ],
    };
    let config = DispatcherConfig {
        retry: instant_retry(3),
        backend_deadline: Duration::from_secs(10),
    };
    let dispatcher = dispatcher(backend, bus, config);

    let result = dispatcher.dispatch(&valid_credentials(), kv_write_request()).await;
    assert!(matches!(result.outcome, RequestOutcome::Allowed(_)));
    assert_eq!(result.attempts, 2);
}

/// Permanent failures are never retried.
#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let bus = RecordingBus::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = ScriptedBackend {
        calls: calls.clone(),
        script: vec![Err(BackendError::Permanent("no such key".to_string()))],
    };
    let config = DispatcherConfig {
        retry: instant_retry(5),
        backend_deadline: Duration::from_secs(10),
    };
    let dispatcher = dispatcher(backend, bus, config);

    let result = dispatcher.dispatch(&valid_credentials(), kv_write_request()).await;
    assert!(matches!(result.outcome, RequestOutcome::Failed(BackendError::Permanent(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// A timed-out attempt is transient and does not refund the token.
#[tokio::test(start_paused = true)]
async fn timeout_is_transient_and_keeps_the_token() {
    let bus = RecordingBus::default();
    let config = DispatcherConfig {
        retry: instant_retry(2),
        backend_deadline: Duration::from_millis(50),
    };
    let dispatcher = dispatcher(HangingBackend, bus, config);

    let result = dispatcher.dispatch(&valid_credentials(), kv_write_request()).await;

    assert!(matches!(result.outcome, RequestOutcome::Failed(BackendError::Transient(_))));
    assert_eq!(result.attempts, 2);

    // The token consumed at admission stays consumed.
    let remaining = dispatcher
        .limiter()
        .tokens_remaining(&TenantId::new("acme"), Service::Kv)
        .expect("bucket exists");
    assert!(remaining < 5.0);
}

/// Publish failures surface as warnings, never as request failures.
#[tokio::test]
async fn publish_failure_does_not_fail_the_request() {
    let bus = RecordingBus {
        events: Arc::new(Mutex::new(Vec::new())),
        fail: true,
    };
    let backend = ScriptedBackend {
        calls: Arc::new(AtomicUsize::new(0)),
        script: vec![Ok(json!({"ok": true}))],
    };
    let dispatcher = dispatcher(backend, bus, DispatcherConfig::default());

    let result = dispatcher.dispatch(&valid_credentials(), kv_write_request()).await;

    assert!(matches!(result.outcome, RequestOutcome::Allowed(_)));
    assert!(result.publish_error.is_some());
}

/// Session counters track requests per tenant.
#[tokio::test]
async fn session_counters_accumulate() {
    let bus = RecordingBus::default();
    let backend = ScriptedBackend {
        calls: Arc::new(AtomicUsize::new(0)),
        script: vec![Ok(Value::Null)],
    };
    let dispatcher = dispatcher(backend, bus, DispatcherConfig::default());

    for _ in 0 .. 3 {
        let _ = dispatcher.dispatch(&valid_credentials(), kv_write_request()).await;
    }

    let session = dispatcher.sessions().get(&TenantId::new("acme")).expect("session");
    assert_eq!(session.request_count(), 3);
    assert_eq!(session.active_requests(), 0);
}
