//! Reconciler — one sequential pass over the service inventory.
//!
//! Per service: fetch sample and replica count, read prior state, check
//! cooldown, decide, record the new observation, and actuate. A failure for
//! one service is reported and the pass moves on; only an inventory failure
//! aborts the whole pass. There is no retry loop here; the next pass is
//! the retry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;

use scalekeep_core::config::DEFAULT_ACTUATION_TIMEOUT;
use scalekeep_core::{PolicySet, ReplicaCount, ServiceIdentity, UtilizationSample};
use scalekeep_state::{StateError, StateStore};

use crate::clock::{Clock, SystemClock};
use crate::decision::{decide, Decision, HoldReason};
use crate::observer::{PassObserver, TracingObserver};
use crate::provider::{
    ActuationError, ActuationOutcome, Actuator, Inventory, InventoryEntry, MetricsSource,
    ReplicaSource, SourceError,
};

/// Why a service never reached the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// `ignored = true` in the service's policy.
    Config,
    /// The service is network-exposed and `ignore_exposed` is on.
    Exposed,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "ignored_config",
            Self::Exposed => "ignored_exposed",
        }
    }
}

/// Per-service failure. None of these abort the pass.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("metric unavailable: {0}")]
    MetricUnavailable(String),

    #[error("invalid sample: {0}")]
    InvalidSample(String),

    #[error("replica count unavailable: {0}")]
    ReplicaCountUnavailable(String),

    #[error("actuation failed: {0}")]
    ActuationFailed(#[from] ActuationError),

    #[error("persistence error: {0}")]
    Persistence(#[from] StateError),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MetricUnavailable(_) => "metric_unavailable",
            Self::InvalidSample(_) => "invalid_sample",
            Self::ReplicaCountUnavailable(_) => "replica_count_unavailable",
            Self::ActuationFailed(_) => "actuation_failed",
            Self::Persistence(_) => "persistence_error",
        }
    }

    /// True when the service was skipped before any state was touched.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            Self::MetricUnavailable(_) | Self::InvalidSample(_) | Self::ReplicaCountUnavailable(_)
        )
    }
}

/// Pass-level failure: nothing was evaluated.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("inventory fetch failed: {0}")]
    Inventory(SourceError),
}

/// What happened to one service during a pass.
#[derive(Debug)]
pub enum ServiceOutcome {
    Ignored(IgnoreReason),
    Held(HoldReason),
    Scaled {
        from: ReplicaCount,
        to: ReplicaCount,
        /// Activation failed after the configuration was accepted.
        partial: bool,
    },
    Failed(ServiceError),
}

#[derive(Debug)]
pub struct ServiceReport {
    pub id: ServiceIdentity,
    pub outcome: ServiceOutcome,
}

/// Summary of a completed pass.
#[derive(Debug)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Services listed by the inventory.
    pub total: usize,
    /// Services whose sample and replica count were obtained.
    pub processed: usize,
    pub scaled: usize,
    pub ignored: usize,
    pub errors: usize,
    pub services: Vec<ServiceReport>,
}

impl PassReport {
    fn new(started_at: DateTime<Utc>, total: usize) -> Self {
        Self {
            started_at,
            elapsed: Duration::ZERO,
            total,
            processed: 0,
            scaled: 0,
            ignored: 0,
            errors: 0,
            services: Vec::with_capacity(total),
        }
    }

    fn push(&mut self, id: ServiceIdentity, outcome: ServiceOutcome) {
        match &outcome {
            ServiceOutcome::Ignored(_) => self.ignored += 1,
            ServiceOutcome::Held(_) => self.processed += 1,
            ServiceOutcome::Scaled { .. } => {
                self.processed += 1;
                self.scaled += 1;
            }
            ServiceOutcome::Failed(error) => {
                if !error.is_fetch_error() {
                    self.processed += 1;
                }
                self.errors += 1;
            }
        }
        self.services.push(ServiceReport { id, outcome });
    }

    /// Outcome recorded for `id`, if it was part of the pass.
    pub fn outcome(&self, id: &ServiceIdentity) -> Option<&ServiceOutcome> {
        self.services
            .iter()
            .find(|report| &report.id == id)
            .map(|report| &report.outcome)
    }
}

/// Pass-wide knobs from the `[global]` config table.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Skip services the inventory flags as exposed.
    pub ignore_exposed: bool,
    /// Upper bound on a single actuator call.
    pub actuation_timeout: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            ignore_exposed: true,
            actuation_timeout: DEFAULT_ACTUATION_TIMEOUT,
        }
    }
}

/// Drives one reconciliation pass against a source and an actuator.
pub struct Reconciler<S, A> {
    store: StateStore,
    policies: PolicySet,
    source: S,
    actuator: A,
    settings: ReconcileSettings,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn PassObserver>,
}

impl<S, A> Reconciler<S, A>
where
    S: Inventory + MetricsSource + ReplicaSource,
    A: Actuator,
{
    pub fn new(store: StateStore, policies: PolicySet, source: S, actuator: A) -> Self {
        Self {
            store,
            policies,
            source,
            actuator,
            settings: ReconcileSettings::default(),
            clock: Arc::new(SystemClock),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_settings(mut self, settings: ReconcileSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PassObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run a single pass over every service in the inventory.
    pub async fn run_pass(&self) -> Result<PassReport, PassError> {
        let started = Instant::now();
        let entries = match self.source.list_services().await {
            Ok(entries) => entries,
            Err(e) => {
                let error = PassError::Inventory(e);
                self.observer.pass_failed(&error);
                return Err(error);
            }
        };

        self.observer.pass_started(entries.len());
        let mut report = PassReport::new(self.clock.now(), entries.len());

        for entry in entries {
            let outcome = match self.reconcile_service(&entry).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    self.observer.service_failed(&entry.id, &error);
                    ServiceOutcome::Failed(error)
                }
            };
            report.push(entry.id, outcome);
        }

        report.elapsed = started.elapsed();
        self.observer.pass_completed(&report);
        Ok(report)
    }

    async fn reconcile_service(&self, entry: &InventoryEntry) -> Result<ServiceOutcome, ServiceError> {
        let id = &entry.id;
        let policy = self.policies.get(id);

        if policy.ignored {
            self.observer.service_ignored(id, IgnoreReason::Config);
            return Ok(ServiceOutcome::Ignored(IgnoreReason::Config));
        }
        if self.settings.ignore_exposed && entry.exposed {
            self.observer.service_ignored(id, IgnoreReason::Exposed);
            return Ok(ServiceOutcome::Ignored(IgnoreReason::Exposed));
        }

        let current = self.fetch_sample(id).await?;
        let replicas = self
            .source
            .replicas(id)
            .await
            .map_err(|e| ServiceError::ReplicaCountUnavailable(e.to_string()))?;

        let prior = self.store.read(id).last_utilization;
        let in_cooldown = self
            .store
            .is_in_cooldown(id, self.clock.now(), policy.cooldown_window);
        let decision = decide(current, prior, replicas, policy, in_cooldown);
        self.observer
            .service_evaluated(id, current, prior, replicas, &decision);

        // Every store write happens after the engine ran, so a persistence
        // failure always counts as processed.
        self.store.record_observation(id, current)?;

        let target = match decision {
            Decision::Hold(reason) => return Ok(ServiceOutcome::Held(reason)),
            Decision::ScaleUp(target) | Decision::ScaleDown(target) => target,
        };

        let outcome = self.actuate(id, target).await?;
        self.store.record_scale(id, self.clock.now())?;
        self.observer.service_scaled(id, replicas, target, &outcome);

        Ok(ServiceOutcome::Scaled {
            from: replicas,
            to: target,
            partial: matches!(outcome, ActuationOutcome::Partial { .. }),
        })
    }

    async fn fetch_sample(&self, id: &ServiceIdentity) -> Result<UtilizationSample, ServiceError> {
        match self.source.utilization(id).await {
            Ok(Some(raw)) if raw.is_finite() => Ok(UtilizationSample::from_raw(raw)),
            Ok(Some(raw)) => Err(ServiceError::InvalidSample(format!("{raw} is not finite"))),
            Ok(None) => Err(ServiceError::MetricUnavailable("no cpu sample".to_string())),
            Err(SourceError::Invalid(msg)) => Err(ServiceError::InvalidSample(msg)),
            Err(SourceError::Unavailable(msg)) => Err(ServiceError::MetricUnavailable(msg)),
        }
    }

    async fn actuate(
        &self,
        id: &ServiceIdentity,
        target: ReplicaCount,
    ) -> Result<ActuationOutcome, ActuationError> {
        let timeout = self.settings.actuation_timeout;
        match tokio::time::timeout(timeout, self.actuator.scale(id, target)).await {
            Ok(result) => result,
            Err(_) => Err(ActuationError::Timeout(timeout)),
        }
    }
}
