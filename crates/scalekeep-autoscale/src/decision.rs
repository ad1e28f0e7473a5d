//! Decision engine — pure replica decisions from a utilization sample.
//!
//! [`decide`] performs no I/O and keeps no state; the reconciler feeds it the
//! stored previous sample and the cooldown flag.

use std::fmt;

use scalekeep_core::{ReplicaCount, ScalingPolicy, UtilizationSample};

/// Outcome of evaluating one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Scale up to the given replica count.
    ScaleUp(ReplicaCount),
    /// Scale down to the given replica count.
    ScaleDown(ReplicaCount),
    /// Leave the service alone.
    Hold(HoldReason),
}

/// Why a service was held at its current replica count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    IgnoredByConfig,
    Cooldown,
    ScaleUpSuppressedInsufficientRise,
    ScaleDownSuppressedInsufficientDrop,
    Stable,
}

impl HoldReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IgnoredByConfig => "ignored_by_config",
            Self::Cooldown => "cooldown",
            Self::ScaleUpSuppressedInsufficientRise => "scale_up_suppressed_insufficient_rise",
            Self::ScaleDownSuppressedInsufficientDrop => "scale_down_suppressed_insufficient_drop",
            Self::Stable => "stable",
        }
    }
}

impl fmt::Display for HoldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Decision {
    /// Target replica count for scale actions.
    pub fn target(&self) -> Option<ReplicaCount> {
        match self {
            Self::ScaleUp(n) | Self::ScaleDown(n) => Some(*n),
            Self::Hold(_) => None,
        }
    }

    pub fn is_scale(&self) -> bool {
        self.target().is_some()
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScaleUp(n) => write!(f, "scale_up({n})"),
            Self::ScaleDown(n) => write!(f, "scale_down({n})"),
            Self::Hold(reason) => write!(f, "hold({reason})"),
        }
    }
}

/// Decide whether to scale a service.
///
/// `policy` is assumed valid (`down_threshold < up_threshold`,
/// `min_replicas <= max_replicas`); that is checked at config load.
/// Moves at most one replica per call.
pub fn decide(
    current: UtilizationSample,
    prior: Option<UtilizationSample>,
    replicas: ReplicaCount,
    policy: &ScalingPolicy,
    in_cooldown: bool,
) -> Decision {
    if policy.ignored {
        return Decision::Hold(HoldReason::IgnoredByConfig);
    }
    // Checked before thresholds: nothing moves inside the window.
    if in_cooldown {
        return Decision::Hold(HoldReason::Cooldown);
    }

    let cpu = current.value();

    if cpu >= policy.up_threshold && replicas < policy.max_replicas {
        let rose_enough = prior.is_none_or(|p| cpu - p.value() >= policy.hysteresis_delta);
        return if rose_enough {
            Decision::ScaleUp(replicas + 1)
        } else {
            Decision::Hold(HoldReason::ScaleUpSuppressedInsufficientRise)
        };
    }

    if cpu <= policy.down_threshold && replicas > policy.min_replicas {
        let dropped_enough = prior.is_none_or(|p| p.value() - cpu >= policy.hysteresis_delta);
        return if dropped_enough {
            Decision::ScaleDown(replicas - 1)
        } else {
            Decision::Hold(HoldReason::ScaleDownSuppressedInsufficientDrop)
        };
    }

    Decision::Hold(HoldReason::Stable)
}
