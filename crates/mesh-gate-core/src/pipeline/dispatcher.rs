// crates/mesh-gate-core/src/pipeline/dispatcher.rs
// ============================================================================
// Module: Dispatcher
// Description: Request pipeline state machine for admission and dispatch.
// Purpose: Turn an authenticated tool call into one auditable unit of work.
// Dependencies: crate::{core, events, interfaces, limiter, pipeline::retry}
// ============================================================================

//! ## Overview
//! The dispatcher drives each tool call through
//! `Received -> ContextResolved -> PermissionChecked -> QuotaChecked ->
//! BackendInvoked -> {Completed | Denied | Failed}`.
//!
//! ## Invariants
//! - Permission denials short-circuit before any quota consumption; a
//!   forbidden call never burns tenant tokens.
//! - Throttle denials are terminal for the call; callers may re-issue
//!   after `retry_after`, the pipeline never auto-retries them.
//! - Only transient backend failures (including deadline timeouts)
//!   re-enter `BackendInvoked`, bounded by the retry policy. A timed-out
//!   attempt still counts against quota; tokens are never refunded.
//! - Every terminal state with a resolved context emits exactly one
//!   pipeline event. Unauthenticated denials carry no tenant identity
//!   and are left to the caller's audit sink.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use serde_json::Value;
use serde_json::json;

use crate::core::ActiveRequestGuard;
use crate::core::Action;
use crate::core::Forbidden;
use crate::core::PermissionGate;
use crate::core::RequestId;
use crate::core::Service;
use crate::core::SessionRegistry;
use crate::core::TenantContext;
use crate::core::TenantId;
use crate::core::UserId;
use crate::events::EventPublisher;
use crate::interfaces::Authenticator;
use crate::interfaces::BackendConnector;
use crate::interfaces::BackendError;
use crate::interfaces::BackendRequest;
use crate::interfaces::Credentials;
use crate::interfaces::EventBusClient;
use crate::interfaces::PublishError;
use crate::limiter::RateLimiter;
use crate::limiter::Throttled;
use crate::pipeline::retry::RetryPolicy;

// ============================================================================
// SECTION: Requests and Outcomes
// ============================================================================

/// One tool call entering the pipeline.
///
/// The `(service, action, cost)` triple comes from the tool's contract
/// declaration, so new tools can be added without touching the limiter or
/// permission gate.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    /// Caller-supplied request identifier for auditing.
    pub request_id: Option<RequestId>,
    /// Tool name label recorded on audit events.
    pub tool: String,
    /// Service the tool requires.
    pub service: Service,
    /// Action the tool requires.
    pub action: Action,
    /// Quota cost in tokens; fractional and weighted costs supported.
    pub cost: f64,
    /// Tool parameters passed through to the backend untouched.
    pub params: Value,
}

/// Reason a request was denied before reaching the backend.
#[derive(Debug, Clone)]
pub enum DenyReason {
    /// No valid tenant context could be attached.
    Unauthenticated(String),
    /// The permission gate denied the requested action.
    Forbidden(Forbidden),
    /// The rate limiter denied the requested cost.
    Throttled(Throttled),
}

impl DenyReason {
    /// Returns a stable label for audit events.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::Throttled(_) => "throttled",
        }
    }

    /// Returns the wait hint for throttle denials that can succeed later.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled(throttled) => throttled.retry_after(),
            Self::Unauthenticated(_) | Self::Forbidden(_) => None,
        }
    }
}

/// Tagged result of a pipeline run.
#[derive(Debug, Clone)]
pub enum RequestOutcome {
    /// Backend call succeeded; response value for the caller.
    Allowed(Value),
    /// Request denied before or at admission.
    Denied(DenyReason),
    /// Backend failed permanently or exhausted its retry budget.
    Failed(BackendError),
}

impl RequestOutcome {
    /// Returns a stable label for audit events.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Allowed(_) => "completed",
            Self::Denied(_) => "denied",
            Self::Failed(_) => "failed",
        }
    }
}

/// Final result of one pipeline run.
#[derive(Debug)]
pub struct DispatchResult {
    /// Terminal outcome returned to the caller.
    pub outcome: RequestOutcome,
    /// Backend attempts performed (0 when denied at admission).
    pub attempts: u32,
    /// Wall-clock latency of the whole pipeline run.
    pub latency: Duration,
    /// Tenant identity, when a context was resolved.
    pub tenant_id: Option<TenantId>,
    /// Acting user identity, when a context was resolved.
    pub user_id: Option<UserId>,
    /// Event publish failure, surfaced as a non-fatal warning.
    pub publish_error: Option<PublishError>,
}

// ============================================================================
// SECTION: Dispatcher Configuration
// ============================================================================

/// Default per-attempt backend deadline.
const DEFAULT_BACKEND_DEADLINE: Duration = Duration::from_secs(10);

/// Configuration for the dispatch pipeline.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Retry policy applied to transient backend failures.
    pub retry: RetryPolicy,
    /// Per-attempt backend deadline.
    pub backend_deadline: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            backend_deadline: DEFAULT_BACKEND_DEADLINE,
        }
    }
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Request pipeline composing admission checks and backend dispatch.
pub struct Dispatcher<A, B, C> {
    /// External authenticator resolving credentials to contexts.
    authenticator: A,
    /// Fail-closed permission gate.
    gate: PermissionGate,
    /// Shared per-tenant-per-service rate limiter.
    limiter: Arc<RateLimiter>,
    /// Per-tenant session counters.
    sessions: SessionRegistry,
    /// Backend operation implementation.
    backend: B,
    /// Tenant-stamping event publisher.
    publisher: EventPublisher<C>,
    /// Retry and deadline configuration.
    config: DispatcherConfig,
}

impl<A, B, C> Dispatcher<A, B, C>
where
    A: Authenticator,
    B: BackendConnector,
    C: EventBusClient,
{
    /// Creates a dispatcher over the injected collaborators.
    #[must_use]
    pub fn new(
        authenticator: A,
        limiter: Arc<RateLimiter>,
        backend: B,
        publisher: EventPublisher<C>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            authenticator,
            gate: PermissionGate::new(),
            limiter,
            sessions: SessionRegistry::new(),
            backend,
            publisher,
            config,
        }
    }

    /// Returns the shared rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Returns the session registry.
    #[must_use]
    pub const fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Runs one tool call through the pipeline to a terminal state.
    pub async fn dispatch(
        &self,
        credentials: &Credentials,
        request: ToolCallRequest,
    ) -> DispatchResult {
        let started = Instant::now();

        // Received -> ContextResolved. Terminal on failure, no retry.
        let context = match self.authenticator.resolve(credentials).await {
            Ok(context) => context,
            Err(error) => {
                return DispatchResult {
                    outcome: RequestOutcome::Denied(DenyReason::Unauthenticated(
                        error.to_string(),
                    )),
                    attempts: 0,
                    latency: started.elapsed(),
                    tenant_id: None,
                    user_id: None,
                    publish_error: None,
                };
            }
        };

        let session = self.sessions.get_or_create(context.tenant_id());
        session.increment_request_count();
        let _active = ActiveRequestGuard::enter(session);

        // ContextResolved -> PermissionChecked. Must short-circuit before
        // any limiter consumption.
        if let Err(forbidden) = self.gate.check(&context, request.service, request.action) {
            let outcome = RequestOutcome::Denied(DenyReason::Forbidden(forbidden));
            return self.finish(&context, &request, outcome, 0, started).await;
        }

        // PermissionChecked -> QuotaChecked. Terminal for this call.
        if let Err(throttled) = self.limiter.try_acquire(&context, request.service, request.cost)
        {
            let outcome = RequestOutcome::Denied(DenyReason::Throttled(throttled));
            return self.finish(&context, &request, outcome, 0, started).await;
        }

        // QuotaChecked -> BackendInvoked, re-entered only for transient
        // failures within the retry budget.
        let backend_request = BackendRequest {
            service: request.service,
            action: request.action,
            namespace: context.namespace_prefix(),
            params: request.params.clone(),
        };

        let mut attempt: u32 = 1;
        let outcome = loop {
            let invocation = tokio::time::timeout(
                self.config.backend_deadline,
                self.backend.invoke(&backend_request, self.config.backend_deadline),
            )
            .await;

            let error = match invocation {
                Ok(Ok(value)) => break RequestOutcome::Allowed(value),
                Ok(Err(error)) => error,
                Err(_) => BackendError::Transient(format!(
                    "backend deadline of {}ms exceeded",
                    self.config.backend_deadline.as_millis()
                )),
            };

            if !error.is_transient() || attempt >= self.config.retry.max_attempts() {
                break RequestOutcome::Failed(error);
            }

            tokio::time::sleep(self.config.retry.delay_with_jitter(attempt)).await;
            attempt += 1;
        };

        self.finish(&context, &request, outcome, attempt, started).await
    }

    /// Emits the terminal pipeline event and assembles the result.
    async fn finish(
        &self,
        context: &TenantContext,
        request: &ToolCallRequest,
        outcome: RequestOutcome,
        attempts: u32,
        started: Instant,
    ) -> DispatchResult {
        let latency = started.elapsed();
        let event_type = match &outcome {
            RequestOutcome::Allowed(_) => "tool_call_completed",
            RequestOutcome::Denied(_) => "tool_call_denied",
            RequestOutcome::Failed(_) => "tool_call_failed",
        };

        let mut payload = json!({
            "tool": request.tool,
            "service": request.service.as_str(),
            "action": request.action.as_str(),
            "outcome": outcome.label(),
            "latency_ms": u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            "attempts": attempts,
        });
        if let Value::Object(map) = &mut payload {
            if let Some(request_id) = &request.request_id {
                map.insert("request_id".to_string(), Value::String(request_id.to_string()));
            }
            if let RequestOutcome::Denied(reason) = &outcome {
                map.insert("deny_reason".to_string(), Value::String(reason.label().to_string()));
                if let Some(retry_after) = reason.retry_after() {
                    map.insert("retry_after_secs".to_string(), json!(retry_after.as_secs_f64()));
                }
            }
            if let RequestOutcome::Failed(error) = &outcome {
                map.insert("error".to_string(), Value::String(error.to_string()));
            }
        }

        let publish_error =
            self.publisher.publish(context, event_type, payload).await.err();

        DispatchResult {
            outcome,
            attempts,
            latency,
            tenant_id: Some(context.tenant_id().clone()),
            user_id: Some(context.user_id().clone()),
            publish_error,
        }
    }
}
