// crates/mesh-gate-core/src/pipeline/retry.rs
// ============================================================================
// Module: Retry Policy
// Description: Bounded exponential backoff with jitter for transient failures.
// Purpose: Decide how many times and how long to wait between backend retries.
// Dependencies: rand, thiserror
// ============================================================================

//! ## Overview
//! The retry policy applies only to transient backend failures; permission
//! and quota denials are never retried. Delays grow exponentially from a
//! base, are capped, and carry uniform random jitter so synchronized
//! callers spread out. The policy is pure: it computes delays, and the
//! dispatcher does the sleeping.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum configurable attempt count.
pub const MAX_ATTEMPTS: u32 = 10;
/// Default attempt count.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default base delay before the first retry.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
/// Default ceiling on any single delay.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);
/// Default jitter fraction applied on top of the computed delay.
const DEFAULT_JITTER: f64 = 0.2;

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first (1 disables retries).
    max_attempts: u32,
    /// Base delay before the first retry.
    base_delay: Duration,
    /// Ceiling on any single delay.
    max_delay: Duration,
    /// Jitter fraction in `0.0..=1.0` added uniformly at random.
    jitter: f64,
}

/// Retry policy validation errors.
#[derive(Debug, Error)]
pub enum RetryPolicyError {
    /// Attempt count must be in `1..=MAX_ATTEMPTS`.
    #[error("retry attempts out of range: {0}")]
    AttemptsOutOfRange(u32),
    /// Jitter fraction must be in `0.0..=1.0`.
    #[error("retry jitter out of range: {0}")]
    JitterOutOfRange(f64),
}

impl RetryPolicy {
    /// Creates a validated retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`RetryPolicyError`] when the attempt count or jitter
    /// fraction is out of range.
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter: f64,
    ) -> Result<Self, RetryPolicyError> {
        if max_attempts == 0 || max_attempts > MAX_ATTEMPTS {
            return Err(RetryPolicyError::AttemptsOutOfRange(max_attempts));
        }
        if !jitter.is_finite() || !(0.0 ..= 1.0).contains(&jitter) {
            return Err(RetryPolicyError::JitterOutOfRange(jitter));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter,
        })
    }

    /// Returns the total attempt budget including the first attempt.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the deterministic delay after a failed `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let scaled = self.base_delay.saturating_mul(1_u32 << exponent);
        scaled.min(self.max_delay)
    }

    /// Returns [`Self::delay_for`] plus uniform random jitter.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.delay_for(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let fraction = rand::thread_rng().gen_range(0.0 ..= self.jitter);
        base + Duration::from_secs_f64(base.as_secs_f64() * fraction)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: DEFAULT_JITTER,
        }
    }
}
