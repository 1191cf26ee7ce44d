// crates/mesh-gate-core/src/core/limits.rs
// ============================================================================
// Module: Resource Limits
// Description: Per-tenant per-service quota limits as immutable snapshots.
// Purpose: Provide generation-stamped limit values for lazy bucket creation.
// Dependencies: crate::core::service, serde, thiserror
// ============================================================================

//! ## Overview
//! Resource limits map each metered service to a token-bucket capacity and
//! refill rate. A limits value is an immutable snapshot: changing a
//! tenant's tier produces a new snapshot with a fresh generation, and the
//! rate limiter replaces (never mutates) any bucket created under an older
//! generation. This avoids partially-applied limit changes mid-flight.
//!
//! ## Invariants
//! - `capacity >= 1` and `refill_rate > 0` for every service limit.
//! - Two snapshots never share a generation, even when built concurrently.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::service::Service;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Process-wide generation counter for limits snapshots.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// SECTION: Service Limit
// ============================================================================

/// Token-bucket parameters for one service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServiceLimit {
    /// Maximum tokens the bucket can hold.
    pub capacity: f64,
    /// Refill rate in tokens per second.
    pub refill_rate: f64,
}

impl ServiceLimit {
    /// Creates a validated service limit.
    ///
    /// # Errors
    ///
    /// Returns [`LimitsError`] when `capacity < 1`, `refill_rate <= 0`, or
    /// either value is not finite.
    pub fn new(capacity: f64, refill_rate: f64) -> Result<Self, LimitsError> {
        if !capacity.is_finite() || capacity < 1.0 {
            return Err(LimitsError::InvalidCapacity(capacity));
        }
        if !refill_rate.is_finite() || refill_rate <= 0.0 {
            return Err(LimitsError::InvalidRefillRate(refill_rate));
        }
        Ok(Self {
            capacity,
            refill_rate,
        })
    }
}

/// Resource limit validation errors.
#[derive(Debug, Error)]
pub enum LimitsError {
    /// Capacity must be finite and at least one token.
    #[error("invalid bucket capacity: {0}")]
    InvalidCapacity(f64),
    /// Refill rate must be finite and strictly positive.
    #[error("invalid bucket refill rate: {0}")]
    InvalidRefillRate(f64),
}

// ============================================================================
// SECTION: Resource Limits Snapshot
// ============================================================================

/// Immutable per-tenant map from service to bucket parameters.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Per-service limits, ordered for deterministic iteration.
    limits: BTreeMap<Service, ServiceLimit>,
    /// Snapshot generation used for lazy bucket replacement.
    generation: u64,
}

impl ResourceLimits {
    /// Creates a new limits snapshot with a fresh generation.
    #[must_use]
    pub fn new(limits: BTreeMap<Service, ServiceLimit>) -> Self {
        Self {
            limits,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Creates an empty snapshot; every service is unconfigured (deny).
    #[must_use]
    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    /// Returns the limit configured for a service, if any.
    #[must_use]
    pub fn limit(&self, service: Service) -> Option<ServiceLimit> {
        self.limits.get(&service).copied()
    }

    /// Returns the snapshot generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Iterates over configured services in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (Service, ServiceLimit)> + '_ {
        self.limits.iter().map(|(service, limit)| (*service, *limit))
    }
}
