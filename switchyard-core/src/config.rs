//! Configuration types

use crate::error::ConfigError;
use crate::AgentRole;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-role default lease durations, in seconds.
///
/// Every role gets an explicit entry. Lease policy is product input; the
/// library never invents a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseDefaults {
    pub scout: i64,
    pub builder: i64,
    pub reviewer: i64,
    pub curator: i64,
}

impl LeaseDefaults {
    /// Default lease seconds for a role.
    pub fn for_role(&self, role: AgentRole) -> i64 {
        match role {
            AgentRole::Scout => self.scout,
            AgentRole::Builder => self.builder,
            AgentRole::Reviewer => self.reviewer,
            AgentRole::Curator => self.curator,
        }
    }
}

/// Bounded retry policy applied by the caller-side backoff helper after a
/// claim loses to contention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: i32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
}

impl RetryConfig {
    /// Backoff duration for the given zero-based attempt number, capped at
    /// `max_backoff`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32) as f64;
        let backed_off = self.initial_backoff.mul_f64(factor.max(1.0));
        backed_off.min(self.max_backoff)
    }
}

/// Master configuration struct for the coordination bus.
/// ALL values are required - no defaults anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    // Lease clamp bounds (REQUIRED)
    pub min_lease_seconds: i64,
    pub max_lease_seconds: i64,

    // Abandonment policy (REQUIRED)
    /// Number of lease-expiry reassignments after which a task is flagged
    /// Abandoned instead of reopened.
    pub abandon_retry_ceiling: i32,

    // Discovery dedupe (REQUIRED)
    /// Window within which a duplicate task description is rejected.
    pub dedupe_window_seconds: i64,

    // Per-role lease defaults (REQUIRED)
    pub lease_defaults: LeaseDefaults,

    // Caller-side contention backoff (REQUIRED)
    pub claim_retry: RetryConfig,
}

impl BusConfig {
    /// Validate internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_lease_seconds <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "min_lease_seconds",
                value: self.min_lease_seconds.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.max_lease_seconds < self.min_lease_seconds {
            return Err(ConfigError::InvalidValue {
                field: "max_lease_seconds",
                value: self.max_lease_seconds.to_string(),
                reason: "must be >= min_lease_seconds".to_string(),
            });
        }
        if self.abandon_retry_ceiling <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "abandon_retry_ceiling",
                value: self.abandon_retry_ceiling.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.dedupe_window_seconds < 0 {
            return Err(ConfigError::InvalidValue {
                field: "dedupe_window_seconds",
                value: self.dedupe_window_seconds.to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        for role in AgentRole::ALL {
            let lease = self.lease_defaults.for_role(role);
            if lease < self.min_lease_seconds || lease > self.max_lease_seconds {
                return Err(ConfigError::InvalidValue {
                    field: "lease_defaults",
                    value: format!("{}={}", role, lease),
                    reason: "role default outside [min_lease_seconds, max_lease_seconds]".to_string(),
                });
            }
        }
        if self.claim_retry.max_retries < 0 {
            return Err(ConfigError::InvalidValue {
                field: "claim_retry.max_retries",
                value: self.claim_retry.max_retries.to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        if self.claim_retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "claim_retry.backoff_multiplier",
                value: self.claim_retry.backoff_multiplier.to_string(),
                reason: "must be >= 1.0".to_string(),
            });
        }
        Ok(())
    }

    /// Clamp a requested lease to the configured bounds.
    ///
    /// Zero and negative leases are rejected by the contract manager before
    /// this is consulted; clamping only bounds finite positive requests.
    pub fn clamp_lease_seconds(&self, requested: i64) -> i64 {
        requested.clamp(self.min_lease_seconds, self.max_lease_seconds)
    }
}
