// crates/mesh-gate-mcp/src/audit.rs
// ============================================================================
// Module: Gateway Audit Logging
// Description: Structured audit events for tool-call handling.
// Purpose: Emit JSON-line audit records without hard logging dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! This module defines audit event payloads and sinks for tool-call
//! logging. It is intentionally lightweight so deployments can route
//! events to their preferred logging pipeline without redesign. Every
//! terminal pipeline state produces exactly one tool-call event; event
//! publish failures surface separately as warning events.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Tool-call audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Request identifier when provided.
    pub request_id: Option<String>,
    /// Tool name when recognized.
    pub tool: Option<String>,
    /// Tenant identifier when a context was resolved.
    pub tenant_id: Option<String>,
    /// Acting user identifier when a context was resolved.
    pub user_id: Option<String>,
    /// Service label for the tool call.
    pub service: Option<&'static str>,
    /// Action label for the tool call.
    pub action: Option<&'static str>,
    /// Outcome label (`completed`, `denied`, `failed`).
    pub outcome: &'static str,
    /// Deny reason label for denied calls.
    pub deny_reason: Option<&'static str>,
    /// Retry hint in seconds for throttle denials.
    pub retry_after_secs: Option<f64>,
    /// Error description for failed calls.
    pub error: Option<String>,
    /// Pipeline latency in milliseconds.
    pub latency_ms: u64,
    /// Backend attempts performed.
    pub attempts: u32,
}

/// Non-fatal warning event (for example, an audit publish failure).
#[derive(Debug, Clone, Serialize)]
pub struct WarningAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Tenant identifier when known.
    pub tenant_id: Option<String>,
    /// Warning description.
    pub message: String,
}

impl WarningAuditEvent {
    /// Creates a warning event with a consistent timestamp.
    #[must_use]
    pub fn new(tenant_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            event: "gateway_warning",
            timestamp_ms: now_ms(),
            tenant_id,
            message: message.into(),
        }
    }
}

/// Returns the current wall-clock timestamp in epoch milliseconds.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for gateway events.
pub trait GatewayAuditSink: Send + Sync {
    /// Records a tool-call audit event.
    fn record_tool_call(&self, event: &ToolCallAuditEvent);

    /// Records a non-fatal warning event.
    fn record_warning(&self, _event: &WarningAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl GatewayAuditSink for StderrAuditSink {
    fn record_tool_call(&self, event: &ToolCallAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }

    fn record_warning(&self, event: &WarningAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl GatewayAuditSink for FileAuditSink {
    fn record_tool_call(&self, event: &ToolCallAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }

    fn record_warning(&self, event: &WarningAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink for tests.
pub struct NoopAuditSink;

impl GatewayAuditSink for NoopAuditSink {
    fn record_tool_call(&self, _event: &ToolCallAuditEvent) {}

    fn record_warning(&self, _event: &WarningAuditEvent) {}
}
