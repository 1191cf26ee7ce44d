// crates/mesh-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Mesh Gate Interfaces
// Description: Backend-agnostic interfaces for identity, backends, and events.
// Purpose: Define the contract surfaces consumed by the dispatch pipeline.
// Dependencies: crate::core, async-trait, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how Mesh Gate integrates with external systems
//! without embedding backend-specific details. The core never re-derives
//! identity from raw credentials and treats every backend call as an
//! opaque, retryable side effect. Implementations must fail closed on
//! missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::core::Action;
use crate::core::Service;
use crate::core::TenantContext;
use crate::core::TenantId;
use crate::core::UserId;

// ============================================================================
// SECTION: Authenticator
// ============================================================================

/// Raw caller credentials handed to the external authenticator.
///
/// # Invariants
/// - This is a pure request container; values are validated only by the
///   authenticator implementation.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Tenant identifier asserted by the caller, when provided.
    pub tenant_id: Option<TenantId>,
    /// User identifier asserted by the caller, when provided.
    pub user_id: Option<UserId>,
    /// Bearer token or session token, when provided.
    pub token: Option<String>,
}

/// Authentication errors; all map to an unauthenticated denial.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// Required credentials were not supplied.
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    /// Supplied credentials failed validation.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    /// Credentials reference a tenant unknown to the authenticator.
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),
}

/// External authenticator resolving credentials into a tenant context.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolves raw credentials into an immutable tenant context.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when no valid tenant context can be attached;
    /// the pipeline treats this as a terminal, non-retried denial.
    async fn resolve(&self, credentials: &Credentials) -> Result<TenantContext, AuthError>;
}

#[async_trait]
impl<T: Authenticator + ?Sized> Authenticator for std::sync::Arc<T> {
    async fn resolve(&self, credentials: &Credentials) -> Result<TenantContext, AuthError> {
        self.as_ref().resolve(credentials).await
    }
}

// ============================================================================
// SECTION: Backend Connector
// ============================================================================

/// Opaque backend invocation request.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    /// Service being invoked.
    pub service: Service,
    /// Action being performed.
    pub action: Action,
    /// Tenant namespace prefix for key partitioning.
    pub namespace: String,
    /// Tool-supplied parameters, passed through untouched.
    pub params: Value,
}

/// Backend invocation errors, classified for retry decisions.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Expected to succeed if retried (timeout, upstream throttle).
    #[error("transient backend error: {0}")]
    Transient(String),
    /// Will not succeed no matter how many retries (validation,
    /// not-found, conflict).
    #[error("permanent backend error: {0}")]
    Permanent(String),
}

impl BackendError {
    /// Returns true when the error is eligible for retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Backend operation invoked by the dispatcher.
///
/// One implementation per backend pool (key-value store, object storage,
/// event bus, workflow trigger); the dispatcher treats the call as an
/// opaque, retryable side effect.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// Invokes a backend operation with a per-attempt deadline.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Transient`] for failures worth retrying
    /// and [`BackendError::Permanent`] for terminal failures.
    async fn invoke(&self, request: &BackendRequest, deadline: Duration)
    -> Result<Value, BackendError>;
}

// ============================================================================
// SECTION: Event Bus Client
// ============================================================================

/// Event publish errors; non-fatal for the surrounding request.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// Event bus rejected or failed to accept the event.
    #[error("event bus publish failed: {0}")]
    Bus(String),
}

/// External event-bus client consumed by the event publisher.
#[async_trait]
pub trait EventBusClient: Send + Sync {
    /// Publishes an event with an already-merged payload.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the event could not be handed off;
    /// callers log the failure and never fail the request for it.
    async fn publish(&self, event_type: &str, payload: Value) -> Result<(), PublishError>;
}
