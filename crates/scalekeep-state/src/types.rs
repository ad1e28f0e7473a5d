//! Persisted per-service record.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use scalekeep_core::{ServiceIdentity, UtilizationSample};

/// What the store remembers about a service between passes.
///
/// Both fields are optional on disk: a missing field reads back as "never
/// observed", and the zero-value record stands in for a service the store
/// has never seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceState {
    /// When the last accepted scale action happened (ISO-8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scaled_at: Option<DateTime<Utc>>,
    /// Utilization observed on the previous pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_utilization: Option<UtilizationSample>,
}

impl ServiceState {
    /// True iff a scale was recorded and less than `window` has elapsed.
    pub fn in_cooldown(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let Some(last) = self.last_scaled_at else {
            return false;
        };
        let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(last) < window
    }

    /// Time left before the cooldown expires, if any.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>, window: Duration) -> Option<Duration> {
        let last = self.last_scaled_at?;
        let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
        let remaining = window.checked_sub(&now.signed_duration_since(last))?;
        remaining.to_std().ok().filter(|d| !d.is_zero())
    }
}

/// A stored record together with its key, as returned by listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRecord {
    #[serde(rename = "service")]
    pub id: ServiceIdentity,
    #[serde(flatten)]
    pub state: ServiceState,
}
