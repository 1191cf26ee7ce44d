// crates/mesh-gate-core/src/limiter/mod.rs
// ============================================================================
// Module: Rate Limiter
// Description: Sharded per-tenant-per-service token-bucket rate limiter.
// Purpose: Enforce quotas without leaking capacity or state across tenants.
// Dependencies: crate::core, crate::limiter::bucket, dashmap, thiserror
// ============================================================================

//! ## Overview
//! The rate limiter owns a sharded concurrent map of
//! `(tenant, service) -> TokenBucket`, creating buckets lazily from the
//! tenant's resource limits. Admission goes through
//! [`RateLimiter::try_acquire`], which refills and consumes under the
//! map's per-key entry lock so token accounting is linearizable per key
//! while unrelated tenants never contend on a shared critical section.
//!
//! ## Invariants
//! - Consumption is fully partitioned by `(tenant, service)`.
//! - Limits snapshots are replaced whole: a bucket created under an older
//!   generation is discarded on the next acquire, never resized in place.
//! - A service with no configured limit is denied unless it appears on
//!   the unmetered allow-list (fail closed).

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bucket;

pub use bucket::TokenBucket;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::time::Duration;
use std::time::Instant;

use dashmap::DashMap;
use thiserror::Error;

use crate::core::Service;
use crate::core::TenantContext;
use crate::core::TenantId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Map key addressing one tenant's bucket for one service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// Tenant owning the bucket.
    pub tenant_id: TenantId,
    /// Service the bucket meters.
    pub service: Service,
}

/// Rate-limit denial carrying the estimated wait until capacity.
///
/// `retry_after` is `None` when the service has no quota configured for
/// the tenant; waiting cannot help in that case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Throttled {
    /// Bucket exists but holds insufficient tokens.
    #[error("rate limit exceeded; retry after {}s", .retry_after.as_secs_f64())]
    QuotaExhausted {
        /// Estimated wait until the requested cost is available.
        retry_after: Duration,
    },
    /// No quota configured for the service and it is not unmetered.
    #[error("no quota configured for service {service}")]
    Unconfigured {
        /// Service without a configured limit.
        service: Service,
    },
}

impl Throttled {
    /// Returns the estimated wait until capacity, when retrying can help.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::QuotaExhausted {
                retry_after,
            } => Some(*retry_after),
            Self::Unconfigured {
                ..
            } => None,
        }
    }
}

/// Map entry pairing a bucket with the limits generation it was built from.
#[derive(Debug)]
struct LimiterEntry {
    /// Generation of the limits snapshot the bucket was created under.
    generation: u64,
    /// Bucket state for the key.
    bucket: TokenBucket,
}

// ============================================================================
// SECTION: Rate Limiter
// ============================================================================

/// Sharded per-tenant-per-service rate limiter.
#[derive(Debug, Default)]
pub struct RateLimiter {
    /// Lazily created buckets keyed by `(tenant, service)`.
    buckets: DashMap<BucketKey, LimiterEntry>,
    /// Services exempt from metering.
    unmetered: BTreeSet<Service>,
}

impl RateLimiter {
    /// Creates a limiter with no unmetered services.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a limiter with an explicit unmetered allow-list.
    #[must_use]
    pub fn with_unmetered(unmetered: BTreeSet<Service>) -> Self {
        Self {
            buckets: DashMap::new(),
            unmetered,
        }
    }

    /// Attempts to consume `cost` tokens for the tenant and service.
    ///
    /// # Errors
    ///
    /// Returns [`Throttled`] when the bucket holds insufficient tokens or
    /// the service has no configured quota.
    pub fn try_acquire(
        &self,
        context: &TenantContext,
        service: Service,
        cost: f64,
    ) -> Result<(), Throttled> {
        self.try_acquire_at(context, service, cost, Instant::now())
    }

    /// [`Self::try_acquire`] with an explicit clock, for simulated time.
    ///
    /// # Errors
    ///
    /// Returns [`Throttled`] when the bucket holds insufficient tokens or
    /// the service has no configured quota.
    pub fn try_acquire_at(
        &self,
        context: &TenantContext,
        service: Service,
        cost: f64,
        now: Instant,
    ) -> Result<(), Throttled> {
        if self.unmetered.contains(&service) {
            return Ok(());
        }

        let Some(limit) = context.resource_limits().limit(service) else {
            return Err(Throttled::Unconfigured {
                service,
            });
        };

        let key = BucketKey {
            tenant_id: context.tenant_id().clone(),
            service,
        };
        let generation = context.resource_limits().generation();

        // The entry guard holds the shard lock for this key, making the
        // refill-then-consume sequence linearizable per key without any
        // global critical section.
        let mut entry = self.buckets.entry(key).or_insert_with(|| LimiterEntry {
            generation,
            bucket: TokenBucket::full(limit, now),
        });

        if entry.generation != generation {
            // Tier changed: discard the stale bucket and start from a
            // fresh snapshot rather than resizing live state.
            entry.generation = generation;
            entry.bucket = TokenBucket::full(limit, now);
        }

        if entry.bucket.refill_and_try_consume(now, cost) {
            Ok(())
        } else {
            Err(Throttled::QuotaExhausted {
                retry_after: entry.bucket.retry_after(cost),
            })
        }
    }

    /// Evicts buckets idle longer than `ttl`, bounding resident memory.
    ///
    /// Eviction takes each shard's write lock, so it cannot race an
    /// in-flight acquire on the same key.
    pub fn evict_idle(&self, ttl: Duration) {
        self.evict_idle_at(ttl, Instant::now());
    }

    /// [`Self::evict_idle`] with an explicit clock, for simulated time.
    pub fn evict_idle_at(&self, ttl: Duration, now: Instant) {
        self.buckets
            .retain(|_, entry| now.saturating_duration_since(entry.bucket.last_refill()) < ttl);
    }

    /// Returns the stored token count for a key without refilling.
    ///
    /// Intended for tests and tenant-facing quota dashboards; `None` when
    /// no bucket has been created for the key.
    #[must_use]
    pub fn tokens_remaining(&self, tenant_id: &TenantId, service: Service) -> Option<f64> {
        let key = BucketKey {
            tenant_id: tenant_id.clone(),
            service,
        };
        self.buckets.get(&key).map(|entry| entry.bucket.tokens())
    }

    /// Returns the number of live buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
