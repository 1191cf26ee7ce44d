// crates/mesh-gate-contract/src/tooling.rs
// ============================================================================
// Module: Tool Contracts
// Description: Canonical tool names, admission specs, and input schemas.
// Purpose: Provide tool contracts for MCP listing and admission routing.
// Dependencies: mesh-gate-core, serde, serde_json
// ============================================================================

//! ## Overview
//! This module defines the canonical tool surface. Each tool maps to one
//! backend `(service, action)` pair and a quota cost; the cost may be
//! weighted per call (bulk event publishes consume one token per entry,
//! clamped to the configured batch ceiling). Tool names are part of the
//! external contract; append new tools at the end to keep listings
//! stable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use mesh_gate_core::Action;
use mesh_gate_core::Service;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default ceiling on the per-call event batch cost.
pub const DEFAULT_MAX_EVENT_BATCH: u32 = 10;

// ============================================================================
// SECTION: Tool Names
// ============================================================================

/// Canonical tool names for the Mesh Gate MCP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Get a value from the key-value store.
    KvGet,
    /// Set a value in the key-value store.
    KvSet,
    /// Delete a value from the key-value store.
    KvDelete,
    /// List key-value entries under a prefix.
    KvList,
    /// Get an artifact by key.
    ArtifactsGet,
    /// Store an artifact.
    ArtifactsPut,
    /// List artifacts with an optional prefix.
    ArtifactsList,
    /// Publish events to the event bus.
    EventsPublish,
    /// Trigger a workflow execution.
    WorkflowTrigger,
}

impl ToolName {
    /// Returns the canonical string name for the tool.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KvGet => "kv_get",
            Self::KvSet => "kv_set",
            Self::KvDelete => "kv_delete",
            Self::KvList => "kv_list",
            Self::ArtifactsGet => "artifacts_get",
            Self::ArtifactsPut => "artifacts_put",
            Self::ArtifactsList => "artifacts_list",
            Self::EventsPublish => "events_publish",
            Self::WorkflowTrigger => "workflow_trigger",
        }
    }

    /// Returns all tool names in canonical order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::KvGet,
            Self::KvSet,
            Self::KvDelete,
            Self::KvList,
            Self::ArtifactsGet,
            Self::ArtifactsPut,
            Self::ArtifactsList,
            Self::EventsPublish,
            Self::WorkflowTrigger,
        ]
    }

    /// Parses a tool name from its string representation.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "kv_get" => Some(Self::KvGet),
            "kv_set" => Some(Self::KvSet),
            "kv_delete" => Some(Self::KvDelete),
            "kv_list" => Some(Self::KvList),
            "artifacts_get" => Some(Self::ArtifactsGet),
            "artifacts_put" => Some(Self::ArtifactsPut),
            "artifacts_list" => Some(Self::ArtifactsList),
            "events_publish" => Some(Self::EventsPublish),
            "workflow_trigger" => Some(Self::WorkflowTrigger),
            _ => None,
        }
    }

    /// Returns the admission spec declared by this tool.
    #[must_use]
    pub const fn spec(self) -> ToolSpec {
        match self {
            Self::KvGet => ToolSpec::unit(Service::Kv, Action::Read),
            Self::KvSet => ToolSpec::unit(Service::Kv, Action::Write),
            Self::KvDelete => ToolSpec::unit(Service::Kv, Action::Delete),
            Self::KvList => ToolSpec::weighted(Service::Kv, Action::List, 2.0),
            Self::ArtifactsGet => ToolSpec::unit(Service::Artifacts, Action::Read),
            // Artifact uploads are the expensive path; weight them so one
            // upload consumes several read-equivalents.
            Self::ArtifactsPut => ToolSpec::weighted(Service::Artifacts, Action::Write, 4.0),
            Self::ArtifactsList => ToolSpec::weighted(Service::Artifacts, Action::List, 2.0),
            Self::EventsPublish => ToolSpec::unit(Service::Events, Action::Publish),
            Self::WorkflowTrigger => ToolSpec::unit(Service::Workflows, Action::Trigger),
        }
    }

    /// Returns the quota cost for a call with the given parameters.
    ///
    /// Bulk event publishes consume one token per entry, clamped to
    /// `max_event_batch`; every other tool uses its declared cost.
    #[must_use]
    pub fn cost_for(self, params: &Value, max_event_batch: u32) -> f64 {
        let base = self.spec().cost;
        if self != Self::EventsPublish {
            return base;
        }
        let entries = params
            .get("entries")
            .and_then(Value::as_array)
            .map_or(1, Vec::len);
        let ceiling = usize::try_from(max_event_batch).unwrap_or(usize::MAX);
        let clamped = entries.max(1).min(ceiling);
        #[allow(clippy::cast_precision_loss, reason = "Batch sizes are far below 2^52.")]
        {
            base * clamped as f64
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Tool Specs
// ============================================================================

/// Admission requirements declared by a tool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Backend service the tool requires.
    pub service: Service,
    /// Action the tool performs on the service.
    pub action: Action,
    /// Base quota cost in tokens.
    pub cost: f64,
}

impl ToolSpec {
    /// Creates a spec with unit cost.
    const fn unit(service: Service, action: Action) -> Self {
        Self {
            service,
            action,
            cost: 1.0,
        }
    }

    /// Creates a spec with a weighted cost.
    const fn weighted(service: Service, action: Action, cost: f64) -> Self {
        Self {
            service,
            action,
            cost,
        }
    }
}

// ============================================================================
// SECTION: Tool Definitions
// ============================================================================

/// Tool definition used by MCP tool listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// MCP tool name.
    pub name: ToolName,
    /// Tool description for clients.
    pub description: String,
    /// JSON schema for tool input.
    pub input_schema: Value,
}

/// Returns the canonical tool definitions in listing order.
#[must_use]
pub fn tool_definitions() -> Vec<ToolDefinition> {
    ToolName::all()
        .iter()
        .map(|tool| ToolDefinition {
            name: *tool,
            description: description_for(*tool).to_string(),
            input_schema: input_schema_for(*tool),
        })
        .collect()
}

/// Returns the client-facing description for a tool.
const fn description_for(tool: ToolName) -> &'static str {
    match tool {
        ToolName::KvGet => "Get a value from the key-value store",
        ToolName::KvSet => "Set a value in the key-value store",
        ToolName::KvDelete => "Delete a value from the key-value store",
        ToolName::KvList => "List key-value entries under a prefix",
        ToolName::ArtifactsGet => "Get an artifact by key",
        ToolName::ArtifactsPut => "Store an artifact (base64-encoded content)",
        ToolName::ArtifactsList => "List artifacts with an optional prefix",
        ToolName::EventsPublish => "Publish one or more events to the event bus",
        ToolName::WorkflowTrigger => "Trigger a workflow execution",
    }
}

/// Returns the JSON input schema for a tool.
fn input_schema_for(tool: ToolName) -> Value {
    match tool {
        ToolName::KvGet | ToolName::KvDelete => json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "The key to operate on"
                }
            },
            "required": ["key"]
        }),
        ToolName::KvSet => json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "The key to set"
                },
                "value": {
                    "type": "string",
                    "description": "The value to store"
                },
                "ttl_hours": {
                    "type": "number",
                    "description": "Time to live in hours"
                }
            },
            "required": ["key", "value"]
        }),
        ToolName::KvList | ToolName::ArtifactsList => json!({
            "type": "object",
            "properties": {
                "prefix": {
                    "type": "string",
                    "description": "Optional prefix filter"
                }
            }
        }),
        ToolName::ArtifactsGet => json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "The artifact key to retrieve"
                }
            },
            "required": ["key"]
        }),
        ToolName::ArtifactsPut => json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "The artifact key"
                },
                "content": {
                    "type": "string",
                    "description": "The artifact content (base64 encoded)"
                },
                "content_type": {
                    "type": "string",
                    "description": "The content type (default: text/plain)"
                }
            },
            "required": ["key", "content"]
        }),
        ToolName::EventsPublish => json!({
            "type": "object",
            "properties": {
                "event_type": {
                    "type": "string",
                    "description": "The event type label"
                },
                "entries": {
                    "type": "array",
                    "description": "Event detail payloads",
                    "items": {"type": "object"}
                }
            },
            "required": ["event_type", "entries"]
        }),
        ToolName::WorkflowTrigger => json!({
            "type": "object",
            "properties": {
                "workflow": {
                    "type": "string",
                    "description": "Workflow identifier to trigger"
                },
                "input": {
                    "type": "object",
                    "description": "Workflow input payload"
                }
            },
            "required": ["workflow"]
        }),
    }
}

#[cfg(test)]
mod tests {
    //! Test-only lint relaxations for panic-based assertions.
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::*;

    #[test]
    fn names_roundtrip_through_parse() {
        for tool in ToolName::all() {
            assert_eq!(ToolName::parse(tool.as_str()), Some(*tool));
        }
        assert_eq!(ToolName::parse("no_such_tool"), None);
    }

    #[test]
    fn every_tool_has_a_definition() {
        let definitions = tool_definitions();
        assert_eq!(definitions.len(), ToolName::all().len());
        for definition in &definitions {
            assert!(definition.input_schema.get("type").is_some());
        }
    }

    #[test]
    fn event_batch_cost_scales_and_clamps() {
        let single = json!({"event_type": "t", "entries": [{}]});
        assert!((ToolName::EventsPublish.cost_for(&single, 10) - 1.0).abs() < f64::EPSILON);

        let triple = json!({"event_type": "t", "entries": [{}, {}, {}]});
        assert!((ToolName::EventsPublish.cost_for(&triple, 10) - 3.0).abs() < f64::EPSILON);

        let twenty = json!({"event_type": "t", "entries": (0..20).map(|_| json!({})).collect::<Vec<_>>()});
        assert!((ToolName::EventsPublish.cost_for(&twenty, 10) - 10.0).abs() < f64::EPSILON);

        // Missing entries default to a single unit.
        let missing = json!({"event_type": "t"});
        assert!((ToolName::EventsPublish.cost_for(&missing, 10) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn weighted_costs_apply_to_expensive_tools() {
        assert!((ToolName::ArtifactsPut.spec().cost - 4.0).abs() < f64::EPSILON);
        assert!((ToolName::KvGet.spec().cost - 1.0).abs() < f64::EPSILON);
    }
}
