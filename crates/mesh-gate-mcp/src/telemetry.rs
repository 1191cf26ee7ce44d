// crates/mesh-gate-mcp/src/telemetry.rs
// ============================================================================
// Module: Gateway Telemetry
// Description: Observability hooks for tool routing.
// Purpose: Provide metric events and latency buckets without hard deps.
// Dependencies: mesh-gate-contract
// ============================================================================

//! ## Overview
//! This module exposes a thin metrics interface for tool-call counters
//! and latency histograms. It is intentionally dependency-light so
//! downstream deployments can plug in Prometheus or OpenTelemetry without
//! redesign. Labels are drawn from closed enums; telemetry must never
//! carry raw payloads or credentials.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use mesh_gate_contract::ToolName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for tool-call histograms.
pub const GATEWAY_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Tool-call outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ToolOutcome {
    /// Backend call succeeded.
    Completed,
    /// Request denied at admission.
    Denied,
    /// Backend failed permanently or exhausted retries.
    Failed,
}

impl ToolOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Denied => "denied",
            Self::Failed => "failed",
        }
    }
}

/// Tool-call metric event payload.
///
/// # Invariants
/// - Optional fields are `None` when the metadata is unavailable.
#[derive(Debug, Clone)]
pub struct GatewayMetricEvent {
    /// Tool name when recognized.
    pub tool: Option<ToolName>,
    /// Request outcome.
    pub outcome: ToolOutcome,
    /// Deny reason label when denied.
    pub deny_reason: Option<&'static str>,
    /// Backend attempts performed.
    pub attempts: u32,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for tool-call counters and latencies.
pub trait GatewayMetrics: Send + Sync {
    /// Records a request counter event.
    fn record_request(&self, event: &GatewayMetricEvent);
    /// Records a latency observation for the request.
    fn record_latency(&self, event: &GatewayMetricEvent, latency: Duration);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are intentionally discarded.
pub struct NoopMetrics;

impl GatewayMetrics for NoopMetrics {
    fn record_request(&self, _event: &GatewayMetricEvent) {}

    fn record_latency(&self, _event: &GatewayMetricEvent, _latency: Duration) {}
}
