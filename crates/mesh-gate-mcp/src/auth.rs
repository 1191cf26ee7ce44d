// crates/mesh-gate-mcp/src/auth.rs
// ============================================================================
// Module: Gateway Authentication
// Description: Request context and the config-provisioned authenticator.
// Purpose: Resolve caller credentials into tenant contexts, fail closed.
// Dependencies: mesh-gate-core, mesh-gate-config, sha2
// ============================================================================

//! ## Overview
//! The reference authenticator resolves bearer tokens against statically
//! provisioned tenant entries from configuration. Contexts are built once
//! at construction (permissions parsed, tier limits snapshotted), so a
//! configuration reload produces fresh limits generations and the limiter
//! replaces stale buckets lazily. Tokens are never logged; audit events
//! carry a SHA-256 fingerprint instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use mesh_gate_config::ConfigError;
use mesh_gate_config::MeshGateConfig;
use mesh_gate_core::AuthError;
use mesh_gate_core::Authenticator;
use mesh_gate_core::ContextType;
use mesh_gate_core::Credentials;
use mesh_gate_core::OrgId;
use mesh_gate_core::PermissionSet;
use mesh_gate_core::TenantContext;
use mesh_gate_core::TenantId;
use mesh_gate_core::UserId;
use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Per-request context carried alongside every tool call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Raw caller credentials for the authenticator.
    pub credentials: Credentials,
    /// Optional request identifier for auditing.
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Builds a request context from caller credentials.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            request_id: None,
        }
    }

    /// Returns a copy with the request identifier set.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the SHA-256 fingerprint of a token as lowercase hex.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

// ============================================================================
// SECTION: Static Authenticator
// ============================================================================

/// Provisioned tenant entry keyed by bearer token.
#[derive(Debug, Clone)]
struct ProvisionedTenant {
    /// Prebuilt tenant context returned on resolve.
    context: TenantContext,
    /// Token fingerprint for audit labeling.
    fingerprint: String,
}

/// Config-provisioned authenticator for the reference deployment.
///
/// # Invariants
/// - Resolution is pure lookup; contexts are immutable snapshots built at
///   construction time.
#[derive(Debug)]
pub struct StaticAuthenticator {
    /// Provisioned tenants keyed by bearer token.
    tenants: BTreeMap<String, ProvisionedTenant>,
}

impl StaticAuthenticator {
    /// Builds the authenticator from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a tenant scope or tier fails
    /// validation.
    pub fn from_config(config: &MeshGateConfig) -> Result<Self, ConfigError> {
        let mut tenants = BTreeMap::new();
        for entry in &config.tenants {
            let permissions =
                PermissionSet::parse_scopes(&entry.scopes).map_err(|err| {
                    ConfigError::InvalidScope {
                        tenant: entry.tenant_id.clone(),
                        message: err.to_string(),
                    }
                })?;
            let resource_limits = config.resource_limits_for_tier(&entry.tier)?;
            let context_type = entry.org_id.as_ref().map_or(ContextType::Personal, |org_id| {
                ContextType::Organization {
                    org_id: OrgId::new(org_id.clone()),
                }
            });
            let context = TenantContext::new(
                TenantId::new(entry.tenant_id.clone()),
                UserId::new(entry.user_id.clone()),
                context_type,
                permissions,
                resource_limits,
            );
            tenants.insert(
                entry.token.clone(),
                ProvisionedTenant {
                    context,
                    fingerprint: token_fingerprint(&entry.token),
                },
            );
        }
        Ok(Self {
            tenants,
        })
    }

    /// Returns the token fingerprint for a resolved credential set.
    #[must_use]
    pub fn fingerprint_for(&self, credentials: &Credentials) -> Option<String> {
        let token = credentials.token.as_deref()?;
        self.tenants.get(token).map(|entry| entry.fingerprint.clone())
    }

    /// Returns the number of provisioned tenants.
    #[must_use]
    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn resolve(&self, credentials: &Credentials) -> Result<TenantContext, AuthError> {
        let token = credentials
            .token
            .as_deref()
            .ok_or_else(|| AuthError::MissingCredentials("bearer token required".to_string()))?;
        let entry = self
            .tenants
            .get(token)
            .ok_or_else(|| AuthError::InvalidCredentials("unrecognized token".to_string()))?;

        // Asserted identities must agree with the provisioned entry.
        if let Some(tenant_id) = &credentials.tenant_id
            && tenant_id != entry.context.tenant_id()
        {
            return Err(AuthError::InvalidCredentials("tenant mismatch".to_string()));
        }
        if let Some(user_id) = &credentials.user_id
            && user_id != entry.context.user_id()
        {
            return Err(AuthError::InvalidCredentials("user mismatch".to_string()));
        }

        Ok(entry.context.clone())
    }
}
