// crates/mesh-gate-config/src/config.rs
// ============================================================================
// Module: Mesh Gate Configuration
// Description: Configuration loading and validation for Mesh Gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: mesh-gate-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and value
//! limits. The resource-limit table is keyed by tier name; each tier maps
//! services to `{capacity, refill_rate}` token-bucket parameters. Static
//! tenant entries provision the reference authenticator. Invalid
//! configuration fails closed to preserve the admission posture.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use mesh_gate_core::LimitsError;
use mesh_gate_core::ResourceLimits;
use mesh_gate_core::RetryPolicy;
use mesh_gate_core::RetryPolicyError;
use mesh_gate_core::Service;
use mesh_gate_core::ServiceLimit;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "mesh-gate.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "MESH_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Minimum bucket idle TTL in seconds.
pub(crate) const MIN_IDLE_TTL_SECS: u64 = 60;
/// Maximum bucket idle TTL in seconds.
pub(crate) const MAX_IDLE_TTL_SECS: u64 = 86_400;
/// Default bucket idle TTL in seconds.
pub(crate) const DEFAULT_IDLE_TTL_SECS: u64 = 3_600;
/// Minimum per-attempt backend deadline in milliseconds.
pub(crate) const MIN_BACKEND_DEADLINE_MS: u64 = 100;
/// Maximum per-attempt backend deadline in milliseconds.
pub(crate) const MAX_BACKEND_DEADLINE_MS: u64 = 60_000;
/// Default per-attempt backend deadline in milliseconds.
pub(crate) const DEFAULT_BACKEND_DEADLINE_MS: u64 = 10_000;
/// Maximum retry base delay in milliseconds.
pub(crate) const MAX_RETRY_BASE_DELAY_MS: u64 = 10_000;
/// Maximum retry delay ceiling in milliseconds.
pub(crate) const MAX_RETRY_MAX_DELAY_MS: u64 = 60_000;
/// Maximum per-call event batch ceiling.
pub(crate) const MAX_EVENT_BATCH: u32 = 1_000;
/// Default per-call event batch ceiling.
pub(crate) const DEFAULT_MAX_EVENT_BATCH: u32 = 10;
/// Maximum number of resource-limit tiers.
pub(crate) const MAX_TIERS: usize = 64;
/// Maximum number of static tenant entries.
pub(crate) const MAX_TENANTS: usize = 1_024;
/// Maximum length of a tenant auth token.
pub(crate) const MAX_TOKEN_LENGTH: usize = 256;
/// Maximum number of permission scopes per tenant.
pub(crate) const MAX_SCOPES: usize = 64;
/// Maximum bucket capacity accepted from configuration.
pub(crate) const MAX_CAPACITY: f64 = 1_000_000_000.0;
/// Maximum refill rate accepted from configuration.
pub(crate) const MAX_REFILL_RATE: f64 = 1_000_000.0;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Mesh Gate configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeshGateConfig {
    /// Rate limiter configuration.
    #[serde(default)]
    pub limiter: LimiterConfig,
    /// Retry policy configuration.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Dispatch pipeline configuration.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Resource-limit tiers keyed by tier name.
    #[serde(default)]
    pub tiers: BTreeMap<String, BTreeMap<String, ServiceLimitConfig>>,
    /// Static tenant entries for the reference authenticator.
    #[serde(default)]
    pub tenants: Vec<TenantEntryConfig>,
}

/// Rate limiter tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct LimiterConfig {
    /// Idle TTL in seconds before a bucket is evicted.
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    /// Services exempt from metering.
    #[serde(default)]
    pub unmetered_services: Vec<String>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: DEFAULT_IDLE_TTL_SECS,
            unmetered_services: Vec::new(),
        }
    }
}

/// Retry policy tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    /// Base delay before the first retry, in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Ceiling on any single delay, in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter fraction in `0.0..=1.0`.
    #[serde(default = "default_retry_jitter")]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            base_delay_ms: default_retry_base_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
            jitter: default_retry_jitter(),
        }
    }
}

/// Dispatch pipeline tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Per-attempt backend deadline in milliseconds.
    #[serde(default = "default_backend_deadline_ms")]
    pub backend_deadline_ms: u64,
    /// Ceiling on the per-call event batch cost.
    #[serde(default = "default_max_event_batch")]
    pub max_event_batch: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            backend_deadline_ms: DEFAULT_BACKEND_DEADLINE_MS,
            max_event_batch: DEFAULT_MAX_EVENT_BATCH,
        }
    }
}

/// Token-bucket parameters for one service within a tier.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ServiceLimitConfig {
    /// Maximum tokens the bucket can hold.
    pub capacity: f64,
    /// Refill rate in tokens per second.
    pub refill_rate: f64,
}

/// Static tenant entry provisioning the reference authenticator.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantEntryConfig {
    /// Tenant identifier.
    pub tenant_id: String,
    /// Acting user identifier.
    pub user_id: String,
    /// Organization identifier; presence selects an organization context.
    #[serde(default)]
    pub org_id: Option<String>,
    /// Resource-limit tier name.
    pub tier: String,
    /// Bearer token accepted for this tenant.
    pub token: String,
    /// Permission scopes (`"kv:write"`, `"events:*"`).
    #[serde(default)]
    pub scopes: Vec<String>,
}

// ============================================================================
// SECTION: Serde Defaults
// ============================================================================

/// Default idle TTL in seconds.
const fn default_idle_ttl_secs() -> u64 {
    DEFAULT_IDLE_TTL_SECS
}

/// Default retry attempt count.
const fn default_retry_attempts() -> u32 {
    3
}

/// Default retry base delay in milliseconds.
const fn default_retry_base_delay_ms() -> u64 {
    100
}

/// Default retry delay ceiling in milliseconds.
const fn default_retry_max_delay_ms() -> u64 {
    5_000
}

/// Default retry jitter fraction.
const fn default_retry_jitter() -> f64 {
    0.2
}

/// Default backend deadline in milliseconds.
const fn default_backend_deadline_ms() -> u64 {
    DEFAULT_BACKEND_DEADLINE_MS
}

/// Default event batch ceiling.
const fn default_max_event_batch() -> u32 {
    DEFAULT_MAX_EVENT_BATCH
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Config file exceeds the size limit.
    #[error("config file too large: {actual} bytes (limit {limit})")]
    TooLarge {
        /// Maximum allowed size in bytes.
        limit: usize,
        /// Observed size in bytes.
        actual: usize,
    },
    /// Config file failed TOML parsing.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Tier table names a service outside the closed service set.
    #[error("unknown service in tier '{tier}': {service}")]
    UnknownService {
        /// Tier naming the service.
        tier: String,
        /// Unrecognized service name.
        service: String,
    },
    /// Unmetered list names a service outside the closed service set.
    #[error("unknown unmetered service: {0}")]
    UnknownUnmeteredService(String),
    /// Tenant entry references a tier that does not exist.
    #[error("tenant '{tenant}' references unknown tier: {tier}")]
    UnknownTier {
        /// Tenant referencing the tier.
        tenant: String,
        /// Unrecognized tier name.
        tier: String,
    },
    /// A numeric tunable is outside its hard bounds.
    #[error("config value out of range: {field} = {value}")]
    OutOfRange {
        /// Field that failed validation.
        field: &'static str,
        /// Rejected value rendered as a string.
        value: String,
    },
    /// Too many entries in a bounded table.
    #[error("too many {what}: {actual} (limit {limit})")]
    TooMany {
        /// Table that overflowed.
        what: &'static str,
        /// Maximum allowed entries.
        limit: usize,
        /// Observed entries.
        actual: usize,
    },
    /// Service limit values failed core validation.
    #[error(transparent)]
    Limits(#[from] LimitsError),
    /// Retry values failed core validation.
    #[error(transparent)]
    Retry(#[from] RetryPolicyError),
    /// Tenant permission scope failed parsing.
    #[error("invalid permission scope for tenant '{tenant}': {message}")]
    InvalidScope {
        /// Tenant owning the scope.
        tenant: String,
        /// Parse failure description.
        message: String,
    },
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl MeshGateConfig {
    /// Loads configuration from `MESH_GATE_CONFIG` or the default path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is missing, oversized,
    /// unparsable, or fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_ENV_VAR)
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_NAME), PathBuf::from);
        Self::load_from_path(&path)
    }

    /// Loads configuration from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is missing, oversized,
    /// unparsable, or fails validation.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let metadata = fs::metadata(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        let actual = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if actual > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                limit: MAX_CONFIG_FILE_SIZE,
                actual,
            });
        }
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        Self::parse_str(&contents)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn parse_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every tunable against its hard bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first failing field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_IDLE_TTL_SECS ..= MAX_IDLE_TTL_SECS).contains(&self.limiter.idle_ttl_secs) {
            return Err(ConfigError::OutOfRange {
                field: "limiter.idle_ttl_secs",
                value: self.limiter.idle_ttl_secs.to_string(),
            });
        }
        for service in &self.limiter.unmetered_services {
            if Service::parse(service).is_none() {
                return Err(ConfigError::UnknownUnmeteredService(service.clone()));
            }
        }

        if self.retry.base_delay_ms > MAX_RETRY_BASE_DELAY_MS {
            return Err(ConfigError::OutOfRange {
                field: "retry.base_delay_ms",
                value: self.retry.base_delay_ms.to_string(),
            });
        }
        if self.retry.max_delay_ms > MAX_RETRY_MAX_DELAY_MS {
            return Err(ConfigError::OutOfRange {
                field: "retry.max_delay_ms",
                value: self.retry.max_delay_ms.to_string(),
            });
        }
        // Attempt and jitter bounds are enforced by the core policy.
        let _ = self.retry_policy()?;

        if !(MIN_BACKEND_DEADLINE_MS ..= MAX_BACKEND_DEADLINE_MS)
            .contains(&self.dispatch.backend_deadline_ms)
        {
            return Err(ConfigError::OutOfRange {
                field: "dispatch.backend_deadline_ms",
                value: self.dispatch.backend_deadline_ms.to_string(),
            });
        }
        if self.dispatch.max_event_batch == 0 || self.dispatch.max_event_batch > MAX_EVENT_BATCH {
            return Err(ConfigError::OutOfRange {
                field: "dispatch.max_event_batch",
                value: self.dispatch.max_event_batch.to_string(),
            });
        }

        if self.tiers.len() > MAX_TIERS {
            return Err(ConfigError::TooMany {
                what: "tiers",
                limit: MAX_TIERS,
                actual: self.tiers.len(),
            });
        }
        for (tier, services) in &self.tiers {
            for (service, limit) in services {
                if Service::parse(service).is_none() {
                    return Err(ConfigError::UnknownService {
                        tier: tier.clone(),
                        service: service.clone(),
                    });
                }
                if limit.capacity > MAX_CAPACITY {
                    return Err(ConfigError::OutOfRange {
                        field: "tier capacity",
                        value: limit.capacity.to_string(),
                    });
                }
                if limit.refill_rate > MAX_REFILL_RATE {
                    return Err(ConfigError::OutOfRange {
                        field: "tier refill_rate",
                        value: limit.refill_rate.to_string(),
                    });
                }
                let _ = ServiceLimit::new(limit.capacity, limit.refill_rate)?;
            }
        }

        if self.tenants.len() > MAX_TENANTS {
            return Err(ConfigError::TooMany {
                what: "tenants",
                limit: MAX_TENANTS,
                actual: self.tenants.len(),
            });
        }
        for tenant in &self.tenants {
            if tenant.token.is_empty() || tenant.token.len() > MAX_TOKEN_LENGTH {
                return Err(ConfigError::OutOfRange {
                    field: "tenant token length",
                    value: tenant.token.len().to_string(),
                });
            }
            if tenant.scopes.len() > MAX_SCOPES {
                return Err(ConfigError::TooMany {
                    what: "tenant scopes",
                    limit: MAX_SCOPES,
                    actual: tenant.scopes.len(),
                });
            }
            if !self.tiers.contains_key(&tenant.tier) {
                return Err(ConfigError::UnknownTier {
                    tenant: tenant.tenant_id.clone(),
                    tier: tenant.tier.clone(),
                });
            }
        }

        Ok(())
    }

    /// Builds a fresh resource-limits snapshot for a tier.
    ///
    /// Every call produces a new generation, so re-resolving a tenant
    /// after a tier change replaces its buckets rather than resizing
    /// them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the tier is unknown or a limit fails
    /// core validation.
    pub fn resource_limits_for_tier(&self, tier: &str) -> Result<ResourceLimits, ConfigError> {
        let services = self.tiers.get(tier).ok_or_else(|| ConfigError::UnknownTier {
            tenant: String::new(),
            tier: tier.to_string(),
        })?;
        let mut limits = BTreeMap::new();
        for (service_name, limit) in services {
            let service = Service::parse(service_name).ok_or_else(|| {
                ConfigError::UnknownService {
                    tier: tier.to_string(),
                    service: service_name.clone(),
                }
            })?;
            limits.insert(service, ServiceLimit::new(limit.capacity, limit.refill_rate)?);
        }
        Ok(ResourceLimits::new(limits))
    }

    /// Builds the validated retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when attempts or jitter are out of range.
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        Ok(RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
            self.retry.jitter,
        )?)
    }

    /// Returns the parsed unmetered service set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a name is outside the service set.
    pub fn unmetered_services(&self) -> Result<BTreeSet<Service>, ConfigError> {
        self.limiter
            .unmetered_services
            .iter()
            .map(|name| {
                Service::parse(name)
                    .ok_or_else(|| ConfigError::UnknownUnmeteredService(name.clone()))
            })
            .collect()
    }

    /// Returns the bucket idle TTL.
    #[must_use]
    pub const fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.limiter.idle_ttl_secs)
    }

    /// Returns the per-attempt backend deadline.
    #[must_use]
    pub const fn backend_deadline(&self) -> Duration {
        Duration::from_millis(self.dispatch.backend_deadline_ms)
    }
}
