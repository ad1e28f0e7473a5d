//! scalekeep.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::policy::{PolicySet, ScalingPolicy};
use crate::types::ServiceIdentity;

pub const DEFAULT_STATE_PATH: &str = "state/scalekeep.redb";
pub const DEFAULT_ACTUATION_TIMEOUT: Duration = Duration::from_secs(30);
pub const ACTUATOR_URL_ENV: &str = "SCALEKEEP_ACTUATOR_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScalekeepConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub defaults: PolicyConfig,
    pub actuator: Option<ActuatorConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Per-service overrides keyed by `project/service`.
    #[serde(default)]
    pub services: BTreeMap<String, PolicyConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub ignore_exposed: Option<bool>,
    pub state_path: Option<PathBuf>,
    pub actuation_timeout: Option<String>,
}

/// Partial policy. Unset fields inherit from `[defaults]`, which in turn
/// inherit the built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(alias = "min")]
    pub min_replicas: Option<u32>,
    #[serde(alias = "max")]
    pub max_replicas: Option<u32>,
    #[serde(alias = "up")]
    pub up_threshold: Option<f64>,
    #[serde(alias = "down")]
    pub down_threshold: Option<f64>,
    pub cooldown: Option<String>,
    #[serde(alias = "delta")]
    pub hysteresis_delta: Option<f64>,
    #[serde(alias = "ignore")]
    pub ignored: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    /// "text" or "json".
    pub format: Option<String>,
    /// Also write logs to this file, rotated by `rotation`.
    pub file: Option<PathBuf>,
    /// "daily", "hourly", "minutely" or "never".
    pub rotation: Option<String>,
    /// Log to stderr. Defaults to true.
    pub console: Option<bool>,
}

impl LoggingConfig {
    pub fn console(&self) -> bool {
        self.console.unwrap_or(true)
    }
}

impl PolicyConfig {
    /// Layer this partial policy over `base`.
    pub fn resolve(&self, base: &ScalingPolicy, scope: &str) -> ConfigResult<ScalingPolicy> {
        let cooldown_window = match &self.cooldown {
            Some(raw) => parse_duration(raw).ok_or_else(|| ConfigError::InvalidDuration {
                field: format!("{scope}.cooldown"),
                value: raw.clone(),
            })?,
            None => base.cooldown_window,
        };
        Ok(ScalingPolicy {
            min_replicas: self.min_replicas.unwrap_or(base.min_replicas),
            max_replicas: self.max_replicas.unwrap_or(base.max_replicas),
            up_threshold: self.up_threshold.unwrap_or(base.up_threshold),
            down_threshold: self.down_threshold.unwrap_or(base.down_threshold),
            cooldown_window,
            hysteresis_delta: self.hysteresis_delta.unwrap_or(base.hysteresis_delta),
            ignored: self.ignored.unwrap_or(base.ignored),
        })
    }
}

impl ScalekeepConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Load `path`, or fall back to built-in defaults when it doesn't exist.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: ScalekeepConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides on top of the file contents.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(ACTUATOR_URL_ENV)
            && !url.trim().is_empty()
        {
            self.actuator = Some(ActuatorConfig { url });
        }
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.policies()?;
        self.actuation_timeout()?;
        Ok(())
    }

    /// Resolve and validate every policy in the file.
    pub fn policies(&self) -> ConfigResult<PolicySet> {
        let default = self.defaults.resolve(&ScalingPolicy::default(), "defaults")?;
        let mut overrides = BTreeMap::new();
        for (key, partial) in &self.services {
            let id: ServiceIdentity = key.parse()?;
            let policy = partial.resolve(&default, key)?;
            overrides.insert(id, policy);
        }
        PolicySet::new(default, overrides)
    }

    pub fn ignore_exposed(&self) -> bool {
        self.global.ignore_exposed.unwrap_or(true)
    }

    pub fn state_path(&self) -> PathBuf {
        self.global
            .state_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH))
    }

    pub fn actuation_timeout(&self) -> ConfigResult<Duration> {
        match &self.global.actuation_timeout {
            Some(raw) => parse_duration(raw).ok_or_else(|| ConfigError::InvalidDuration {
                field: "global.actuation_timeout".to_string(),
                value: raw.clone(),
            }),
            None => Ok(DEFAULT_ACTUATION_TIMEOUT),
        }
    }

    pub fn actuator_url(&self) -> Option<&str> {
        self.actuator.as_ref().map(|a| a.url.as_str())
    }
}

/// Parse a duration string like "5s", "500ms", "5m", or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
