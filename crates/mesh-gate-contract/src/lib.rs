// crates/mesh-gate-contract/src/lib.rs
// ============================================================================
// Module: Mesh Gate Contract Library
// Description: Canonical tool surface exposed by the Mesh Gate MCP server.
// Purpose: Declare per-tool service, action, and quota cost requirements.
// Dependencies: mesh-gate-core, serde, serde_json
// ============================================================================

//! ## Overview
//! The contract crate is the single source of truth for the tool
//! invocation surface: each tool declares the `(service, action)` it
//! requires and the quota cost it consumes. The dispatcher in
//! `mesh-gate-core` is generic over these declarations, so adding a tool
//! never touches the rate limiter or permission gate.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod tooling;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use tooling::DEFAULT_MAX_EVENT_BATCH;
pub use tooling::ToolDefinition;
pub use tooling::ToolName;
pub use tooling::ToolSpec;
pub use tooling::tool_definitions;
