//! Resolved per-service scaling policy.
//!
//! A [`ScalingPolicy`] is what the decision engine consumes. Policies are
//! built from the `[defaults]` and `[services."project/service"]` tables of
//! the config file and validated once at load time, so the engine can treat
//! them as trusted input.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{ReplicaCount, ServiceIdentity};

pub const DEFAULT_MIN_REPLICAS: ReplicaCount = 1;
pub const DEFAULT_MAX_REPLICAS: ReplicaCount = 10;
pub const DEFAULT_UP_THRESHOLD: f64 = 70.0;
pub const DEFAULT_DOWN_THRESHOLD: f64 = 30.0;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_HYSTERESIS_DELTA: f64 = 5.0;

/// Bounds, thresholds, and cooldown for a single service.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingPolicy {
    pub min_replicas: ReplicaCount,
    pub max_replicas: ReplicaCount,
    /// Scale up at or above this utilization (percent).
    pub up_threshold: f64,
    /// Scale down at or below this utilization (percent).
    pub down_threshold: f64,
    /// Minimum time between accepted scale actions.
    pub cooldown_window: Duration,
    /// Required change versus the previous sample, in percentage points.
    pub hysteresis_delta: f64,
    /// Never scale this service.
    pub ignored: bool,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            min_replicas: DEFAULT_MIN_REPLICAS,
            max_replicas: DEFAULT_MAX_REPLICAS,
            up_threshold: DEFAULT_UP_THRESHOLD,
            down_threshold: DEFAULT_DOWN_THRESHOLD,
            cooldown_window: DEFAULT_COOLDOWN,
            hysteresis_delta: DEFAULT_HYSTERESIS_DELTA,
            ignored: false,
        }
    }
}

impl ScalingPolicy {
    /// Check the invariants the decision engine relies on.
    ///
    /// `scope` names the policy in the error ("defaults" or a service key).
    pub fn validate(&self, scope: &str) -> ConfigResult<()> {
        let invalid = |reason: String| ConfigError::InvalidPolicy {
            scope: scope.to_string(),
            reason,
        };

        if self.min_replicas > self.max_replicas {
            return Err(invalid(format!(
                "min_replicas ({}) exceeds max_replicas ({})",
                self.min_replicas, self.max_replicas
            )));
        }
        for (name, value) in [
            ("up_threshold", self.up_threshold),
            ("down_threshold", self.down_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(invalid(format!("{name} ({value}) must be within 0..=100")));
            }
        }
        if self.down_threshold >= self.up_threshold {
            return Err(invalid(format!(
                "down_threshold ({}) must be below up_threshold ({})",
                self.down_threshold, self.up_threshold
            )));
        }
        if !self.hysteresis_delta.is_finite() || self.hysteresis_delta < 0.0 {
            return Err(invalid(format!(
                "hysteresis_delta ({}) must be a non-negative number",
                self.hysteresis_delta
            )));
        }
        Ok(())
    }
}

/// Validated policies for every configured service, plus the fallback.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    default: ScalingPolicy,
    overrides: BTreeMap<ServiceIdentity, ScalingPolicy>,
}

impl PolicySet {
    pub fn new(
        default: ScalingPolicy,
        overrides: BTreeMap<ServiceIdentity, ScalingPolicy>,
    ) -> ConfigResult<Self> {
        default.validate("defaults")?;
        for (id, policy) in &overrides {
            policy.validate(&id.to_string())?;
        }
        Ok(Self { default, overrides })
    }

    /// Policy for `id`, falling back to the defaults.
    pub fn get(&self, id: &ServiceIdentity) -> &ScalingPolicy {
        self.overrides.get(id).unwrap_or(&self.default)
    }

    pub fn default_policy(&self) -> &ScalingPolicy {
        &self.default
    }

    /// Services with an explicit override, in key order.
    pub fn overrides(&self) -> impl Iterator<Item = (&ServiceIdentity, &ScalingPolicy)> {
        self.overrides.iter()
    }
}
