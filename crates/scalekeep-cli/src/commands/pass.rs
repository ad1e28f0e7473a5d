//! `scalekeep pass` — run one reconciliation pass and print its report.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::info;

use scalekeep_autoscale::{
    Actuator, PassReport, ReconcileSettings, Reconciler, ServiceOutcome,
};
use scalekeep_core::ScalekeepConfig;
use scalekeep_state::StateStore;

use crate::actuator::{DryRunActuator, WebhookActuator};
use crate::snapshot::SnapshotSource;

pub async fn run(
    config: &ScalekeepConfig,
    state_path: &Path,
    snapshot: &Path,
    dry_run: bool,
) -> Result<()> {
    let report = pass(config, state_path, snapshot, dry_run).await?;
    println!("{}", serde_json::to_string_pretty(&render(&report))?);
    Ok(())
}

/// Run the pass. With `dry_run` the persisted state is copied into memory
/// first, so cooldowns are honored but nothing is written back.
pub async fn pass(
    config: &ScalekeepConfig,
    state_path: &Path,
    snapshot: &Path,
    dry_run: bool,
) -> Result<PassReport> {
    let source = SnapshotSource::load(snapshot)?;
    let policies = config.policies()?;
    let settings = ReconcileSettings {
        ignore_exposed: config.ignore_exposed(),
        actuation_timeout: config.actuation_timeout()?,
    };

    if dry_run {
        info!(snapshot = %snapshot.display(), "starting dry-run pass");
        let store = seeded_memory_store(state_path)?;
        let reconciler = Reconciler::new(store, policies, source, DryRunActuator).with_settings(settings);
        return execute(reconciler).await;
    }

    let Some(url) = config.actuator_url() else {
        bail!("no actuator configured: set [actuator] url or SCALEKEEP_ACTUATOR_URL, or use --dry-run");
    };
    let actuator = WebhookActuator::new(url)?;
    let store = StateStore::open(state_path)
        .with_context(|| format!("failed to open state store {}", state_path.display()))?;

    info!(snapshot = %snapshot.display(), actuator = url, "starting pass");
    let reconciler = Reconciler::new(store, policies, source, actuator).with_settings(settings);
    execute(reconciler).await
}

async fn execute<A: Actuator>(reconciler: Reconciler<SnapshotSource, A>) -> Result<PassReport> {
    let report = reconciler.run_pass().await?;
    Ok(report)
}

/// In-memory copy of the store at `path`. A missing file yields an empty store.
fn seeded_memory_store(path: &Path) -> Result<StateStore> {
    let memory = StateStore::open_in_memory()?;
    if !path.exists() {
        return Ok(memory);
    }

    let records = StateStore::read_snapshot(path)
        .with_context(|| format!("failed to read state store {}", path.display()))?;
    for record in records {
        if let Some(sample) = record.state.last_utilization {
            memory.record_observation(&record.id, sample)?;
        }
        if let Some(at) = record.state.last_scaled_at {
            memory.record_scale(&record.id, at)?;
        }
    }
    Ok(memory)
}

/// JSON form of a pass report for stdout.
pub fn render(report: &PassReport) -> Value {
    let services: Vec<Value> = report
        .services
        .iter()
        .map(|svc| {
            let mut entry = json!({ "service": svc.id.to_string() });
            let detail = match &svc.outcome {
                ServiceOutcome::Ignored(reason) => json!({
                    "outcome": "ignored",
                    "reason": reason.as_str(),
                }),
                ServiceOutcome::Held(reason) => json!({
                    "outcome": "held",
                    "reason": reason.as_str(),
                }),
                ServiceOutcome::Scaled { from, to, partial } => json!({
                    "outcome": "scaled",
                    "from": from,
                    "to": to,
                    "partial": partial,
                }),
                ServiceOutcome::Failed(error) => json!({
                    "outcome": "failed",
                    "error": error.kind(),
                    "message": error.to_string(),
                }),
            };
            if let (Some(entry), Value::Object(detail)) = (entry.as_object_mut(), detail) {
                entry.extend(detail);
            }
            entry
        })
        .collect();

    json!({
        "started_at": report.started_at.to_rfc3339(),
        "elapsed_ms": report.elapsed.as_millis() as u64,
        "total": report.total,
        "processed": report.processed,
        "scaled": report.scaled,
        "ignored": report.ignored,
        "errors": report.errors,
        "services": services,
    })
}
