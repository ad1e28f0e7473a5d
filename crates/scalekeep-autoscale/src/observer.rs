//! Observability port for reconciliation passes.
//!
//! The reconciler reports what it does through a [`PassObserver`] handed
//! to it by the caller. [`TracingObserver`] turns those callbacks into
//! `tracing` events; tests plug in their own recorder.

use tracing::{debug, error, info, warn};

use scalekeep_core::{ReplicaCount, ServiceIdentity, UtilizationSample};

use crate::decision::{Decision, HoldReason};
use crate::provider::ActuationOutcome;
use crate::reconciler::{IgnoreReason, PassError, PassReport, ServiceError};

/// Receives pass events. Every method defaults to a no-op.
pub trait PassObserver: Send + Sync {
    fn pass_started(&self, _services: usize) {}

    fn service_ignored(&self, _id: &ServiceIdentity, _reason: IgnoreReason) {}

    fn service_evaluated(
        &self,
        _id: &ServiceIdentity,
        _current: UtilizationSample,
        _prior: Option<UtilizationSample>,
        _replicas: ReplicaCount,
        _decision: &Decision,
    ) {
    }

    fn service_scaled(
        &self,
        _id: &ServiceIdentity,
        _from: ReplicaCount,
        _to: ReplicaCount,
        _outcome: &ActuationOutcome,
    ) {
    }

    fn service_failed(&self, _id: &ServiceIdentity, _error: &ServiceError) {}

    fn pass_completed(&self, _report: &PassReport) {}

    fn pass_failed(&self, _error: &PassError) {}
}

/// Emits structured `tracing` events for every pass callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PassObserver for TracingObserver {
    fn pass_started(&self, services: usize) {
        info!(services, "reconciliation pass started");
    }

    fn service_ignored(&self, id: &ServiceIdentity, reason: IgnoreReason) {
        info!(service = %id, reason = reason.as_str(), "service ignored");
    }

    fn service_evaluated(
        &self,
        id: &ServiceIdentity,
        current: UtilizationSample,
        prior: Option<UtilizationSample>,
        replicas: ReplicaCount,
        decision: &Decision,
    ) {
        let cpu = current.value();
        let prior = prior.map(UtilizationSample::value);
        match decision {
            Decision::ScaleUp(target) | Decision::ScaleDown(target) => {
                info!(service = %id, cpu, ?prior, replicas, to = *target, %decision, "scaling");
            }
            Decision::Hold(HoldReason::Stable) => {
                debug!(service = %id, cpu, ?prior, replicas, "stable, no action needed");
            }
            Decision::Hold(reason) => {
                info!(service = %id, cpu, ?prior, replicas, reason = reason.as_str(), "holding");
            }
        }
    }

    fn service_scaled(
        &self,
        id: &ServiceIdentity,
        from: ReplicaCount,
        to: ReplicaCount,
        outcome: &ActuationOutcome,
    ) {
        match outcome {
            ActuationOutcome::Applied => {
                info!(service = %id, from, to, "scaled");
            }
            ActuationOutcome::Partial { reason } => {
                warn!(
                    service = %id,
                    from,
                    to,
                    %reason,
                    "scale partially applied, entering cooldown anyway"
                );
            }
        }
    }

    fn service_failed(&self, id: &ServiceIdentity, error: &ServiceError) {
        warn!(service = %id, kind = error.kind(), error = %error, "service evaluation failed");
    }

    fn pass_completed(&self, report: &PassReport) {
        if report.total == 0 {
            warn!("no services found in inventory");
        }
        info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            total = report.total,
            processed = report.processed,
            scaled = report.scaled,
            ignored = report.ignored,
            errors = report.errors,
            "reconciliation pass completed"
        );
    }

    fn pass_failed(&self, error: &PassError) {
        error!(error = %error, "reconciliation pass aborted");
    }
}
