//! `scalekeep status` — show persisted per-service state.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use scalekeep_core::{ScalekeepConfig, ScalingPolicy, ServiceIdentity};
use scalekeep_state::{ServiceRecord, StateStore};

pub fn run(config: &ScalekeepConfig, state_path: &Path, service: Option<&str>) -> Result<()> {
    let output = status(config, state_path, service, Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// One object for a named service, an array for all of them. The store
/// is opened read-only; a missing store means nothing was recorded yet.
pub fn status(
    config: &ScalekeepConfig,
    state_path: &Path,
    service: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Value> {
    let policies = config.policies()?;
    let records = if state_path.exists() {
        StateStore::read_snapshot(state_path)
            .with_context(|| format!("failed to read state store {}", state_path.display()))?
    } else {
        Vec::new()
    };

    match service {
        Some(raw) => {
            let id: ServiceIdentity = raw.parse()?;
            let record = records
                .into_iter()
                .find(|record| record.id == id)
                .unwrap_or(ServiceRecord { id, state: Default::default() });
            Ok(describe(&record, policies.get(&record.id), now))
        }
        None => Ok(Value::Array(
            records
                .iter()
                .map(|record| describe(record, policies.get(&record.id), now))
                .collect(),
        )),
    }
}

fn describe(record: &ServiceRecord, policy: &ScalingPolicy, now: DateTime<Utc>) -> Value {
    let remaining = record.state.cooldown_remaining(now, policy.cooldown_window);
    let mut value = serde_json::to_value(record).unwrap_or_else(|_| json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.insert("in_cooldown".to_string(), json!(remaining.is_some()));
        obj.insert(
            "cooldown_remaining_secs".to_string(),
            json!(remaining.map(|d| d.as_secs())),
        );
    }
    value
}
