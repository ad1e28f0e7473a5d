//! `scalekeep decide` — evaluate the decision engine for ad-hoc inputs.

use anyhow::Result;

use scalekeep_autoscale::{decide, Decision};
use scalekeep_core::{ReplicaCount, ScalekeepConfig, ServiceIdentity, UtilizationSample};

pub fn run(
    config: &ScalekeepConfig,
    cpu: f64,
    replicas: ReplicaCount,
    prior: Option<f64>,
    service: Option<&str>,
    cooldown: bool,
) -> Result<()> {
    let decision = evaluate(config, cpu, replicas, prior, service, cooldown)?;
    println!("{decision}");
    Ok(())
}

/// Uses the named service's policy when given, otherwise `[defaults]`.
pub fn evaluate(
    config: &ScalekeepConfig,
    cpu: f64,
    replicas: ReplicaCount,
    prior: Option<f64>,
    service: Option<&str>,
    cooldown: bool,
) -> Result<Decision> {
    let policies = config.policies()?;
    let policy = match service {
        Some(raw) => {
            let id: ServiceIdentity = raw.parse()?;
            policies.get(&id).clone()
        }
        None => policies.default_policy().clone(),
    };

    Ok(decide(
        UtilizationSample::from_raw(cpu),
        prior.map(UtilizationSample::from_raw),
        replicas,
        &policy,
        cooldown,
    ))
}
