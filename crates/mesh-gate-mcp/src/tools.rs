// crates/mesh-gate-mcp/src/tools.rs
// ============================================================================
// Module: Tool Router
// Description: Tool routing for the Mesh Gate MCP surface.
// Purpose: Map MCP tool calls onto the admission/dispatch pipeline.
// Dependencies: mesh-gate-core, mesh-gate-contract
// ============================================================================

//! ## Overview
//! The tool router resolves an MCP tool name to its contract declaration
//! (`service`, `action`, quota cost), hands the call to the core
//! dispatcher, and emits audit plus telemetry events for every routed
//! call. Tool listings are permission-filtered so callers only see tools
//! their context can actually invoke.
//!
//! ## Invariants
//! - Admission decisions live in the core pipeline; the router never
//!   checks permissions or quota itself.
//! - Every dispatched call produces exactly one audit record and one
//!   metric event.
//! - Tool inputs are untrusted and pass through to backends unparsed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use mesh_gate_contract::ToolDefinition;
use mesh_gate_contract::ToolName;
use mesh_gate_contract::tool_definitions;
use mesh_gate_core::Authenticator;
use mesh_gate_core::BackendConnector;
use mesh_gate_core::BackendError;
use mesh_gate_core::DenyReason;
use mesh_gate_core::DispatchResult;
use mesh_gate_core::Dispatcher;
use mesh_gate_core::DispatcherConfig;
use mesh_gate_core::EventBusClient;
use mesh_gate_core::EventPublisher;
use mesh_gate_core::RateLimiter;
use mesh_gate_core::RequestId;
use mesh_gate_core::RequestOutcome;
use mesh_gate_core::ToolCallRequest;
use serde_json::Value;
use thiserror::Error;

use crate::audit::GatewayAuditSink;
use crate::audit::ToolCallAuditEvent;
use crate::audit::WarningAuditEvent;
use crate::audit::now_ms;
use crate::auth::RequestContext;
use crate::telemetry::GatewayMetricEvent;
use crate::telemetry::GatewayMetrics;
use crate::telemetry::ToolOutcome;

// ============================================================================
// SECTION: Tool Router
// ============================================================================

/// Configuration inputs for building a tool router.
pub struct ToolRouterConfig<B, C> {
    /// Authenticator shared between listing and dispatch.
    pub authenticator: Arc<dyn Authenticator>,
    /// Shared per-tenant-per-service rate limiter.
    pub limiter: Arc<RateLimiter>,
    /// Backend operation implementation.
    pub backend: B,
    /// Tenant-stamping event publisher.
    pub publisher: EventPublisher<C>,
    /// Retry and deadline configuration for the pipeline.
    pub dispatch: DispatcherConfig,
    /// Audit sink for tool-call records.
    pub audit: Arc<dyn GatewayAuditSink>,
    /// Metrics sink for counters and latencies.
    pub metrics: Arc<dyn GatewayMetrics>,
    /// Ceiling on the per-call event batch cost.
    pub max_event_batch: u32,
}

/// Tool router over the admission/dispatch pipeline.
pub struct ToolRouter<B, C> {
    /// Authenticator used for permission-filtered listings.
    authenticator: Arc<dyn Authenticator>,
    /// Core dispatch pipeline.
    dispatcher: Dispatcher<Arc<dyn Authenticator>, B, C>,
    /// Audit sink for tool-call records.
    audit: Arc<dyn GatewayAuditSink>,
    /// Metrics sink for counters and latencies.
    metrics: Arc<dyn GatewayMetrics>,
    /// Ceiling on the per-call event batch cost.
    max_event_batch: u32,
}

impl<B, C> ToolRouter<B, C>
where
    B: BackendConnector,
    C: EventBusClient,
{
    /// Creates a tool router.
    #[must_use]
    pub fn new(config: ToolRouterConfig<B, C>) -> Self {
        let dispatcher = Dispatcher::new(
            config.authenticator.clone(),
            config.limiter,
            config.backend,
            config.publisher,
            config.dispatch,
        );
        Self {
            authenticator: config.authenticator,
            dispatcher,
            audit: config.audit,
            metrics: config.metrics,
            max_event_batch: config.max_event_batch,
        }
    }

    /// Returns the shared rate limiter (dashboards, idle reaping).
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        self.dispatcher.limiter()
    }

    /// Evicts limiter buckets idle longer than `ttl`.
    pub fn evict_idle_buckets(&self, ttl: Duration) {
        self.dispatcher.limiter().evict_idle(ttl);
    }

    /// Lists the tools the caller's context is permitted to invoke.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Unauthenticated`] when no tenant context can
    /// be attached.
    pub async fn list_tools(
        &self,
        context: &RequestContext,
    ) -> Result<Vec<ToolDefinition>, ToolError> {
        let tenant = self
            .authenticator
            .resolve(&context.credentials)
            .await
            .map_err(|err| ToolError::Unauthenticated(err.to_string()))?;
        Ok(tool_definitions()
            .into_iter()
            .filter(|definition| {
                let spec = definition.name.spec();
                tenant.permissions().allows(spec.service, spec.action)
            })
            .collect())
    }

    /// Handles a tool call by name with a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the tool is unknown or the pipeline
    /// reaches a denied or failed terminal state.
    pub async fn handle_tool_call(
        &self,
        context: &RequestContext,
        name: &str,
        payload: Value,
    ) -> Result<Value, ToolError> {
        let tool = ToolName::parse(name).ok_or(ToolError::UnknownTool)?;
        let spec = tool.spec();
        let cost = tool.cost_for(&payload, self.max_event_batch);

        let request = ToolCallRequest {
            request_id: context.request_id.clone().map(RequestId::new),
            tool: tool.as_str().to_string(),
            service: spec.service,
            action: spec.action,
            cost,
            params: payload,
        };

        let result = self.dispatcher.dispatch(&context.credentials, request).await;
        self.record(context, tool, &result);
        into_response(result)
    }

    /// Emits the audit record and metric events for a dispatched call.
    fn record(&self, context: &RequestContext, tool: ToolName, result: &DispatchResult) {
        let spec = tool.spec();
        let (outcome, deny_reason, retry_after_secs, error) = match &result.outcome {
            RequestOutcome::Allowed(_) => (ToolOutcome::Completed, None, None, None),
            RequestOutcome::Denied(reason) => (
                ToolOutcome::Denied,
                Some(reason.label()),
                reason.retry_after().map(|wait| wait.as_secs_f64()),
                None,
            ),
            RequestOutcome::Failed(failure) => {
                (ToolOutcome::Failed, None, None, Some(failure.to_string()))
            }
        };

        let event = ToolCallAuditEvent {
            event: "tool_call",
            timestamp_ms: now_ms(),
            request_id: context.request_id.clone(),
            tool: Some(tool.as_str().to_string()),
            tenant_id: result.tenant_id.as_ref().map(ToString::to_string),
            user_id: result.user_id.as_ref().map(ToString::to_string),
            service: Some(spec.service.as_str()),
            action: Some(spec.action.as_str()),
            outcome: outcome.as_str(),
            deny_reason,
            retry_after_secs,
            error,
            latency_ms: u64::try_from(result.latency.as_millis()).unwrap_or(u64::MAX),
            attempts: result.attempts,
        };
        self.audit.record_tool_call(&event);

        if let Some(publish_error) = &result.publish_error {
            self.audit.record_warning(&WarningAuditEvent::new(
                result.tenant_id.as_ref().map(ToString::to_string),
                format!("pipeline event publish failed: {publish_error}"),
            ));
        }

        let metric = GatewayMetricEvent {
            tool: Some(tool),
            outcome,
            deny_reason,
            attempts: result.attempts,
        };
        self.metrics.record_request(&metric);
        self.metrics.record_latency(&metric, result.latency);
    }
}

/// Converts a dispatch result into the tool-call response.
fn into_response(result: DispatchResult) -> Result<Value, ToolError> {
    match result.outcome {
        RequestOutcome::Allowed(value) => Ok(value),
        RequestOutcome::Denied(DenyReason::Unauthenticated(message)) => {
            Err(ToolError::Unauthenticated(message))
        }
        RequestOutcome::Denied(DenyReason::Forbidden(forbidden)) => {
            Err(ToolError::Forbidden(forbidden.to_string()))
        }
        RequestOutcome::Denied(DenyReason::Throttled(throttled)) => Err(ToolError::Throttled {
            retry_after: throttled.retry_after(),
        }),
        RequestOutcome::Failed(error) => Err(ToolError::Backend(error)),
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tool routing errors.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool name not recognized.
    #[error("unknown tool")]
    UnknownTool,
    /// Missing or invalid authentication.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// Authenticated caller not authorized for the tool's action.
    #[error("unauthorized: {0}")]
    Forbidden(String),
    /// Rate limit denied the call; retry after the hint when present.
    #[error("rate limit exceeded")]
    Throttled {
        /// Estimated wait until the call can succeed, when retrying helps.
        retry_after: Option<Duration>,
    },
    /// Backend failed permanently or exhausted its retry budget.
    #[error(transparent)]
    Backend(BackendError),
}

impl ToolError {
    /// Returns the JSON-RPC style error code for the variant.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::UnknownTool => -32_601,
            Self::Forbidden(_) => -32_000,
            Self::Throttled {
                ..
            } => -32_001,
            Self::Unauthenticated(_) => -32_002,
            Self::Backend(_) => -32_003,
        }
    }
}
