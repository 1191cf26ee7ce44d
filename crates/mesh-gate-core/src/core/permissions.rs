// crates/mesh-gate-core/src/core/permissions.rs
// ============================================================================
// Module: Permissions and Gate
// Description: Capability scopes and the fail-closed permission gate.
// Purpose: Decide whether a tenant may perform a service action.
// Dependencies: crate::core::service, serde, thiserror
// ============================================================================

//! ## Overview
//! Permissions are `(service, action)` capability pairs with an explicit
//! wildcard rule: a scope of `kv:*` grants every action on the `kv`
//! service. Membership is an enum match, not string parsing; the scope
//! string form (`"kv:write"`) exists only for configuration interchange.
//!
//! ## Invariants
//! - The gate fails closed: an empty permission set denies everything.
//! - A permission denial never consumes rate-limiter quota; the gate is
//!   checked strictly before `RateLimiter::try_acquire` in the pipeline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::context::TenantContext;
use crate::core::service::Action;
use crate::core::service::Service;

// ============================================================================
// SECTION: Permission Types
// ============================================================================

/// Action pattern granted by a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPattern {
    /// Every action on the service (the `*` wildcard).
    Any,
    /// A single named action.
    Exact(Action),
}

impl ActionPattern {
    /// Returns true when the pattern covers the requested action.
    #[must_use]
    pub fn matches(self, action: Action) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(granted) => granted == action,
        }
    }
}

/// Capability naming a service plus an action pattern.
///
/// Uniqueness is by the `(service, pattern)` pair; a [`PermissionSet`]
/// deduplicates on insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// Service the capability applies to.
    pub service: Service,
    /// Action pattern granted on the service.
    pub pattern: ActionPattern,
}

impl Permission {
    /// Creates a permission for a single action.
    #[must_use]
    pub const fn exact(service: Service, action: Action) -> Self {
        Self {
            service,
            pattern: ActionPattern::Exact(action),
        }
    }

    /// Creates a wildcard permission covering every action on a service.
    #[must_use]
    pub const fn wildcard(service: Service) -> Self {
        Self {
            service,
            pattern: ActionPattern::Any,
        }
    }

    /// Parses a scope string of the form `service:action` or `service:*`.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when the scope is malformed or names an
    /// unknown service or action.
    pub fn parse_scope(scope: &str) -> Result<Self, PermissionError> {
        let (service_name, action_name) = scope
            .split_once(':')
            .ok_or_else(|| PermissionError::MalformedScope(scope.to_string()))?;
        let service = Service::parse(service_name)
            .ok_or_else(|| PermissionError::UnknownService(service_name.to_string()))?;
        if action_name == "*" {
            return Ok(Self::wildcard(service));
        }
        let action = Action::parse(action_name)
            .ok_or_else(|| PermissionError::UnknownAction(action_name.to_string()))?;
        Ok(Self::exact(service, action))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pattern {
            ActionPattern::Any => write!(f, "{}:*", self.service),
            ActionPattern::Exact(action) => write!(f, "{}:{action}", self.service),
        }
    }
}

/// Permission parsing errors.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// Scope string is not of the form `service:action`.
    #[error("malformed permission scope: {0}")]
    MalformedScope(String),
    /// Scope names a service outside the closed service set.
    #[error("unknown service in permission scope: {0}")]
    UnknownService(String),
    /// Scope names an action outside the closed action set.
    #[error("unknown action in permission scope: {0}")]
    UnknownAction(String),
}

// ============================================================================
// SECTION: Permission Set
// ============================================================================

/// Deduplicated set of permissions owned by a tenant context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet {
    /// Granted permissions, ordered for deterministic serialization.
    grants: BTreeSet<Permission>,
}

impl PermissionSet {
    /// Creates an empty permission set (denies everything).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            grants: BTreeSet::new(),
        }
    }

    /// Builds a set from an iterator of permissions, deduplicating.
    #[must_use]
    pub fn from_grants(grants: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            grants: grants.into_iter().collect(),
        }
    }

    /// Parses a set from scope strings (`"kv:write"`, `"events:*"`).
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] on the first malformed scope.
    pub fn parse_scopes<S: AsRef<str>>(
        scopes: impl IntoIterator<Item = S>,
    ) -> Result<Self, PermissionError> {
        let mut grants = BTreeSet::new();
        for scope in scopes {
            grants.insert(Permission::parse_scope(scope.as_ref())?);
        }
        Ok(Self {
            grants,
        })
    }

    /// Inserts a permission, returning true if it was newly added.
    pub fn insert(&mut self, permission: Permission) -> bool {
        self.grants.insert(permission)
    }

    /// Returns true when the set grants the requested service action.
    #[must_use]
    pub fn allows(&self, service: Service, action: Action) -> bool {
        self.grants
            .iter()
            .any(|grant| grant.service == service && grant.pattern.matches(action))
    }

    /// Returns the number of distinct grants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Returns true when no permissions are granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Iterates over the granted permissions in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.grants.iter()
    }
}

// ============================================================================
// SECTION: Permission Gate
// ============================================================================

/// Permission denial for a requested service action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("forbidden: {service}:{action} not granted")]
pub struct Forbidden {
    /// Service the caller requested.
    pub service: Service,
    /// Action the caller requested.
    pub action: Action,
}

/// Fail-closed capability check applied before any quota consumption.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionGate;

impl PermissionGate {
    /// Creates a permission gate.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Checks whether the tenant context grants the requested action.
    ///
    /// # Errors
    ///
    /// Returns [`Forbidden`] when the context does not grant
    /// `(service, action)` either exactly or through a wildcard.
    pub fn check(
        &self,
        context: &TenantContext,
        service: Service,
        action: Action,
    ) -> Result<(), Forbidden> {
        if context.permissions().allows(service, action) {
            Ok(())
        } else {
            Err(Forbidden {
                service,
                action,
            })
        }
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
    fn scope_parsing_roundtrips() {
        let write = Permission::parse_scope("kv:write").expect("parse kv:write");
        assert_eq!(write, Permission::exact(Service::Kv, Action::Write));
        assert_eq!(write.to_string(), "kv:write");

        let wildcard = Permission::parse_scope("events:*").expect("parse events:*");
        assert_eq!(wildcard, Permission::wildcard(Service::Events));
        assert_eq!(wildcard.to_string(), "events:*");
    }

    #[test]
    fn scope_parsing_rejects_unknown_names() {
        assert!(matches!(
            Permission::parse_scope("nosuch:write"),
            Err(PermissionError::UnknownService(_))
        ));
        assert!(matches!(
            Permission::parse_scope("kv:frobnicate"),
            Err(PermissionError::UnknownAction(_))
        ));
        assert!(matches!(
            Permission::parse_scope("kv-write"),
            Err(PermissionError::MalformedScope(_))
        ));
    }

    #[test]
    fn wildcard_covers_every_action() {
        let set = PermissionSet::from_grants([Permission::wildcard(Service::Kv)]);
        assert!(set.allows(Service::Kv, Action::Read));
        assert!(set.allows(Service::Kv, Action::Write));
        assert!(set.allows(Service::Kv, Action::Delete));
        assert!(!set.allows(Service::Events, Action::Publish));
    }

    #[test]
    fn exact_grant_does_not_leak_across_actions() {
        let set = PermissionSet::from_grants([Permission::exact(Service::Kv, Action::Read)]);
        assert!(set.allows(Service::Kv, Action::Read));
        assert!(!set.allows(Service::Kv, Action::Write));
    }

    #[test]
    fn empty_set_denies_everything() {
        let set = PermissionSet::new();
        for service in Service::all() {
            assert!(!set.allows(*service, Action::Read));
        }
    }

    #[test]
    fn duplicate_scopes_deduplicate() {
        let set = PermissionSet::parse_scopes(["kv:write", "kv:write", "kv:*"])
            .expect("parse scopes");
        assert_eq!(set.len(), 2);
    }
}
