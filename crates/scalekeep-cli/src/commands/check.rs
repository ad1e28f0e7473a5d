//! `scalekeep check` — validate the config and print what it resolves to.

use anyhow::Result;
use serde_json::{json, Map, Value};

use scalekeep_core::{ScalekeepConfig, ScalingPolicy};

pub fn run(config: &ScalekeepConfig) -> Result<()> {
    let resolved = resolve(config)?;
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

pub fn resolve(config: &ScalekeepConfig) -> Result<Value> {
    let policies = config.policies()?;
    let timeout = config.actuation_timeout()?;

    let services: Map<String, Value> = policies
        .overrides()
        .map(|(id, policy)| (id.to_string(), policy_json(policy)))
        .collect();

    Ok(json!({
        "global": {
            "ignore_exposed": config.ignore_exposed(),
            "state_path": config.state_path().display().to_string(),
            "actuation_timeout_secs": timeout.as_secs_f64(),
            "actuator_url": config.actuator_url(),
        },
        "defaults": policy_json(policies.default_policy()),
        "services": services,
    }))
}

fn policy_json(policy: &ScalingPolicy) -> Value {
    json!({
        "min_replicas": policy.min_replicas,
        "max_replicas": policy.max_replicas,
        "up_threshold": policy.up_threshold,
        "down_threshold": policy.down_threshold,
        "cooldown_secs": policy.cooldown_window.as_secs(),
        "hysteresis_delta": policy.hysteresis_delta,
        "ignored": policy.ignored,
    })
}
