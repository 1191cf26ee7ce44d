// crates/mesh-gate-core/src/core/service.rs
// ============================================================================
// Module: Service and Action Surface
// Description: Closed enums for backend services and actions.
// Purpose: Shared service/action naming across contracts, limits, and config.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Mesh Gate meters and authorizes a closed set of backend services and
//! actions. Representing them as enums (rather than free-form strings)
//! keeps permission checks and quota keys type-safe; string forms exist
//! only at the configuration and audit boundaries.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Backend service kinds metered by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    /// Key-value storage.
    Kv,
    /// Object/artifact storage.
    Artifacts,
    /// Event bus publishing.
    Events,
    /// Workflow orchestration triggers.
    Workflows,
}

impl Service {
    /// Returns the canonical string name for the service.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kv => "kv",
            Self::Artifacts => "artifacts",
            Self::Events => "events",
            Self::Workflows => "workflows",
        }
    }

    /// Returns all services in canonical order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Kv, Self::Artifacts, Self::Events, Self::Workflows]
    }

    /// Parses a service from its string representation.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "kv" => Some(Self::Kv),
            "artifacts" => Some(Self::Artifacts),
            "events" => Some(Self::Events),
            "workflows" => Some(Self::Workflows),
            _ => None,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Actions a tool call can request against a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Read a single entry.
    Read,
    /// Write or overwrite an entry.
    Write,
    /// Delete an entry.
    Delete,
    /// List entries under a prefix.
    List,
    /// Publish events to the bus.
    Publish,
    /// Trigger a workflow execution.
    Trigger,
}

impl Action {
    /// Returns the canonical string name for the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Publish => "publish",
            Self::Trigger => "trigger",
        }
    }

    /// Parses an action from its string representation.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "delete" => Some(Self::Delete),
            "list" => Some(Self::List),
            "publish" => Some(Self::Publish),
            "trigger" => Some(Self::Trigger),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
