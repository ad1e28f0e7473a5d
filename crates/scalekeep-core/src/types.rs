//! Domain types shared by the decision engine, the state store, and the
//! upstream adapters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of running instances of a service.
pub type ReplicaCount = u32;

// ── Identity ──────────────────────────────────────────────────────

/// Stable key of a scalable service: `{project}/{service}`.
///
/// Used as the state store key and as the key of per-service overrides in
/// the config file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceIdentity {
    project: String,
    service: String,
}

impl ServiceIdentity {
    pub fn new(project: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            service: service.into(),
        }
    }

    /// Build an identity from upstream names, rejecting anything that
    /// would not round-trip through `project/service`.
    pub fn try_new(project: &str, service: &str) -> Result<Self, ConfigError> {
        let valid = |part: &str| !part.is_empty() && !part.contains('/');
        if valid(project) && valid(service) {
            Ok(Self::new(project, service))
        } else {
            Err(ConfigError::InvalidIdentity(format!("{project}/{service}")))
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Key used for the state store table.
    pub fn table_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.service)
    }
}

impl FromStr for ServiceIdentity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((project, service)) => {
                Self::try_new(project, service).map_err(|_| ConfigError::InvalidIdentity(s.to_string()))
            }
            None => Err(ConfigError::InvalidIdentity(s.to_string())),
        }
    }
}

impl TryFrom<String> for ServiceIdentity {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServiceIdentity> for String {
    fn from(id: ServiceIdentity) -> Self {
        id.to_string()
    }
}

// ── Utilization ───────────────────────────────────────────────────

/// CPU utilization in percent, always within `[0, 100]`.
///
/// Upstream metric scale is unreliable, so every constructor funnels through
/// [`UtilizationSample::from_raw`]:
///
/// ```text
/// raw > 1000  → raw / 1000   (per-mille correction)
/// raw > 100   → raw / 10     (per-thousand heuristic)
/// raw < 0     → 0
/// ```
///
/// followed by a final clamp into `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct UtilizationSample(f64);

impl UtilizationSample {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 100.0;

    /// Normalize a raw upstream reading into a percentage.
    pub fn from_raw(raw: f64) -> Self {
        if !raw.is_finite() {
            return Self(Self::MIN);
        }
        let corrected = if raw > 1000.0 {
            raw / 1000.0
        } else if raw > 100.0 {
            raw / 10.0
        } else if raw < 0.0 {
            Self::MIN
        } else {
            raw
        };
        Self(corrected.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl From<f64> for UtilizationSample {
    fn from(raw: f64) -> Self {
        Self::from_raw(raw)
    }
}

impl From<UtilizationSample> for f64 {
    fn from(sample: UtilizationSample) -> Self {
        sample.0
    }
}

impl fmt::Display for UtilizationSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}
