// crates/mesh-gate-mcp/src/lib.rs
// ============================================================================
// Module: Mesh Gate MCP
// Description: MCP-facing gateway assembly over the Mesh Gate core.
// Purpose: Provide tool routing, auth, audit, and telemetry seams.
// Dependencies: mesh-gate-core, mesh-gate-contract, mesh-gate-config
// ============================================================================

//! ## Overview
//! Mesh Gate MCP assembles the admission core into a tool-call surface:
//! a static authenticator provisioned from configuration, a tool router
//! mapping MCP tool names onto the dispatch pipeline, structured audit
//! sinks, a dependency-light metrics seam, and in-memory backend
//! implementations used by tests and local development. Wire framing is
//! intentionally absent; hosts own the transport and call
//! [`ToolRouter`] directly.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod backends;
pub mod telemetry;
pub mod tools;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileAuditSink;
pub use audit::GatewayAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use audit::ToolCallAuditEvent;
pub use audit::WarningAuditEvent;
pub use auth::RequestContext;
pub use auth::StaticAuthenticator;
pub use auth::token_fingerprint;
pub use backends::InMemoryBackend;
pub use backends::RecordingEventBus;
pub use telemetry::GATEWAY_LATENCY_BUCKETS_MS;
pub use telemetry::GatewayMetricEvent;
pub use telemetry::GatewayMetrics;
pub use telemetry::NoopMetrics;
pub use telemetry::ToolOutcome;
pub use tools::ToolError;
pub use tools::ToolRouter;
pub use tools::ToolRouterConfig;
