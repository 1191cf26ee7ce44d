// crates/mesh-gate-core/src/core/context.rs
// ============================================================================
// Module: Tenant Context and Sessions
// Description: Resolved tenant identity and per-tenant session counters.
// Purpose: Carry immutable identity snapshots through the dispatch pipeline.
// Dependencies: crate::core::{identifiers, limits, permissions}, dashmap
// ============================================================================

//! ## Overview
//! A [`TenantContext`] is the resolved identity produced by an external
//! authenticator: tenant id, acting user id, context type, granted
//! permissions, and resource limits. It is immutable after construction
//! and shared freely across concurrent tasks without synchronization.
//!
//! A [`TenantSession`] tracks lock-free request counters per tenant for
//! observability; the active-request counter is maintained through an
//! RAII guard so it stays balanced on every exit path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::OrgId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::UserId;
use crate::core::limits::ResourceLimits;
use crate::core::permissions::PermissionSet;

// ============================================================================
// SECTION: Context Type
// ============================================================================

/// Whether a tenant identity is a personal or an organization account.
///
/// The context type determines the default resource-limit tier and the
/// namespace prefix used to partition backend storage keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ContextType {
    /// Personal account context.
    Personal,
    /// Organization account context.
    Organization {
        /// Organization identifier.
        org_id: OrgId,
    },
}

impl ContextType {
    /// Returns a stable label for audit events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Organization {
                ..
            } => "organization",
        }
    }
}

// ============================================================================
// SECTION: Tenant Context
// ============================================================================

/// Resolved tenant identity carried through the pipeline.
///
/// # Invariants
/// - Never mutated after creation; identity re-derivation from raw
///   credentials happens only in the external authenticator.
#[derive(Debug, Clone)]
pub struct TenantContext {
    /// Tenant identifier.
    tenant_id: TenantId,
    /// Acting user identifier.
    user_id: UserId,
    /// Personal or organization context.
    context_type: ContextType,
    /// Granted capability set.
    permissions: PermissionSet,
    /// Resource-limit snapshot for this context.
    resource_limits: ResourceLimits,
}

impl TenantContext {
    /// Creates a resolved tenant context.
    #[must_use]
    pub const fn new(
        tenant_id: TenantId,
        user_id: UserId,
        context_type: ContextType,
        permissions: PermissionSet,
        resource_limits: ResourceLimits,
    ) -> Self {
        Self {
            tenant_id,
            user_id,
            context_type,
            permissions,
            resource_limits,
        }
    }

    /// Returns the tenant identifier.
    #[must_use]
    pub const fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Returns the acting user identifier.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Returns the context type.
    #[must_use]
    pub const fn context_type(&self) -> &ContextType {
        &self.context_type
    }

    /// Returns the granted permission set.
    #[must_use]
    pub const fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    /// Returns the resource-limit snapshot.
    #[must_use]
    pub const fn resource_limits(&self) -> &ResourceLimits {
        &self.resource_limits
    }

    /// Returns true if this is a personal context.
    #[must_use]
    pub const fn is_personal(&self) -> bool {
        matches!(self.context_type, ContextType::Personal)
    }

    /// Returns the namespace prefix used to partition backend keys.
    ///
    /// Personal contexts namespace by user; organization contexts
    /// namespace by organization, then user.
    #[must_use]
    pub fn namespace_prefix(&self) -> String {
        match &self.context_type {
            ContextType::Personal => format!("user:{}", self.user_id),
            ContextType::Organization {
                org_id,
            } => format!("org:{}:user:{}", org_id, self.user_id),
        }
    }
}

// ============================================================================
// SECTION: Tenant Session
// ============================================================================

/// Per-tenant session with lock-free request counters.
#[derive(Debug)]
pub struct TenantSession {
    /// Tenant the session belongs to.
    tenant_id: TenantId,
    /// Session identifier.
    session_id: SessionId,
    /// Total requests observed on this session.
    request_count: AtomicU64,
    /// Requests currently in flight.
    active_requests: AtomicU64,
}

impl TenantSession {
    /// Creates a session for a tenant.
    #[must_use]
    pub const fn new(tenant_id: TenantId, session_id: SessionId) -> Self {
        Self {
            tenant_id,
            session_id,
            request_count: AtomicU64::new(0),
            active_requests: AtomicU64::new(0),
        }
    }

    /// Returns the tenant identifier.
    #[must_use]
    pub const fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Increments the total request counter and returns the new value.
    pub fn increment_request_count(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the total requests observed on this session.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Returns the number of requests currently in flight.
    #[must_use]
    pub fn active_requests(&self) -> u64 {
        self.active_requests.load(Ordering::Relaxed)
    }
}

/// RAII guard keeping the in-flight request counter balanced.
#[derive(Debug)]
pub struct ActiveRequestGuard {
    /// Session whose counter is held.
    session: Arc<TenantSession>,
}

impl ActiveRequestGuard {
    /// Marks a request in flight until the guard is dropped.
    #[must_use]
    pub fn enter(session: Arc<TenantSession>) -> Self {
        session.active_requests.fetch_add(1, Ordering::Relaxed);
        Self {
            session,
        }
    }
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        // Saturating decrement: never wrap below zero.
        let _ = self.session.active_requests.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |current| current.checked_sub(1),
        );
    }
}

// ============================================================================
// SECTION: Session Registry
// ============================================================================

/// Concurrent registry of per-tenant sessions, created lazily.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// Sessions keyed by tenant.
    sessions: DashMap<TenantId, Arc<TenantSession>>,
    /// Monotonic counter for generated session identifiers.
    next_session: AtomicU64,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for a tenant, creating it on first use.
    #[must_use]
    pub fn get_or_create(&self, tenant_id: &TenantId) -> Arc<TenantSession> {
        let entry = self.sessions.entry(tenant_id.clone()).or_insert_with(|| {
            let seq = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
            Arc::new(TenantSession::new(
                tenant_id.clone(),
                SessionId::new(format!("session-{seq}")),
            ))
        });
        Arc::clone(entry.value())
    }

    /// Returns the session for a tenant, if one exists.
    #[must_use]
    pub fn get(&self, tenant_id: &TenantId) -> Option<Arc<TenantSession>> {
        self.sessions.get(tenant_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the total in-flight requests across all sessions.
    #[must_use]
    pub fn total_active_requests(&self) -> u64 {
        self.sessions.iter().map(|entry| entry.active_requests()).sum()
    }
}
