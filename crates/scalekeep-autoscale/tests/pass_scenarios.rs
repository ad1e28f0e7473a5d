//! Multi-pass scenarios: cooldown, hysteresis across passes, actuation
//! failure modes, and state surviving a restart.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use redb::StorageBackend;
use redb::backends::InMemoryBackend;
use scalekeep_autoscale::*;
use scalekeep_core::{PolicySet, ReplicaCount, ScalingPolicy, ServiceIdentity, UtilizationSample};
use scalekeep_state::StateStore;

// ── Fakes ─────────────────────────────────────────────────────────

/// Upstream platform whose samples and replica counts tests mutate
/// between passes.
#[derive(Default)]
struct FakePlatform {
    services: Mutex<Vec<InventoryEntry>>,
    cpu: Mutex<HashMap<String, f64>>,
    replicas: Mutex<HashMap<String, ReplicaCount>>,
    inventory_down: Mutex<bool>,
}

impl FakePlatform {
    fn with_service(key: &str, cpu: f64, replicas: ReplicaCount) -> Arc<Self> {
        let platform = Arc::new(Self::default());
        platform.add(key, cpu, replicas);
        platform
    }

    fn add(&self, key: &str, cpu: f64, replicas: ReplicaCount) {
        self.services
            .lock()
            .unwrap()
            .push(InventoryEntry::new(key.parse().unwrap(), false));
        self.set(key, cpu, replicas);
    }

    fn set(&self, key: &str, cpu: f64, replicas: ReplicaCount) {
        self.cpu.lock().unwrap().insert(key.to_string(), cpu);
        self.replicas.lock().unwrap().insert(key.to_string(), replicas);
    }
}

impl Inventory for FakePlatform {
    async fn list_services(&self) -> Result<Vec<InventoryEntry>, SourceError> {
        if *self.inventory_down.lock().unwrap() {
            return Err(SourceError::Unavailable("connection refused".to_string()));
        }
        Ok(self.services.lock().unwrap().clone())
    }
}

impl MetricsSource for FakePlatform {
    async fn utilization(&self, id: &ServiceIdentity) -> Result<Option<f64>, SourceError> {
        Ok(self.cpu.lock().unwrap().get(&id.to_string()).copied())
    }
}

impl ReplicaSource for FakePlatform {
    async fn replicas(&self, id: &ServiceIdentity) -> Result<ReplicaCount, SourceError> {
        self.replicas
            .lock()
            .unwrap()
            .get(&id.to_string())
            .copied()
            .ok_or_else(|| SourceError::Unavailable("not found".to_string()))
    }
}

#[derive(Clone, Copy)]
enum Behavior {
    Apply,
    Partial,
    Reject,
    Hang,
}

/// Actuator that applies accepted targets back onto the platform.
struct FakeActuator {
    platform: Arc<FakePlatform>,
    behavior: Mutex<Behavior>,
    calls: Mutex<Vec<(String, ReplicaCount)>>,
    /// Flag raised when the named service is scaled.
    trip: Mutex<Option<(String, Arc<AtomicBool>)>>,
}

impl FakeActuator {
    fn new(platform: Arc<FakePlatform>) -> Arc<Self> {
        Arc::new(Self {
            platform,
            behavior: Mutex::new(Behavior::Apply),
            calls: Mutex::new(Vec::new()),
            trip: Mutex::new(None),
        })
    }

    fn trip_on(&self, key: &str, flag: Arc<AtomicBool>) {
        *self.trip.lock().unwrap() = Some((key.to_string(), flag));
    }

    fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    fn calls(&self) -> Vec<(String, ReplicaCount)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Actuator for FakeActuator {
    async fn scale(
        &self,
        id: &ServiceIdentity,
        replicas: ReplicaCount,
    ) -> Result<ActuationOutcome, ActuationError> {
        self.calls.lock().unwrap().push((id.to_string(), replicas));
        if let Some((key, flag)) = self.trip.lock().unwrap().as_ref()
            && *key == id.to_string()
        {
            flag.store(true, Ordering::SeqCst);
        }
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            Behavior::Apply => {
                self.platform
                    .replicas
                    .lock()
                    .unwrap()
                    .insert(id.to_string(), replicas);
                Ok(ActuationOutcome::Applied)
            }
            Behavior::Partial => Ok(ActuationOutcome::Partial {
                reason: "deploy trigger failed".to_string(),
            }),
            Behavior::Reject => Err(ActuationError::Rejected("HTTP 500".to_string())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ActuationOutcome::Applied)
            }
        }
    }
}

/// Observer that remembers every decision it was shown.
#[derive(Default)]
struct RecordingObserver {
    decisions: Mutex<Vec<(String, Decision)>>,
    failures: Mutex<Vec<String>>,
    aborted: Mutex<bool>,
}

impl PassObserver for RecordingObserver {
    fn service_evaluated(
        &self,
        id: &ServiceIdentity,
        _current: UtilizationSample,
        _prior: Option<UtilizationSample>,
        _replicas: ReplicaCount,
        decision: &Decision,
    ) {
        self.decisions
            .lock()
            .unwrap()
            .push((id.to_string(), *decision));
    }

    fn service_failed(&self, id: &ServiceIdentity, error: &ServiceError) {
        self.failures
            .lock()
            .unwrap()
            .push(format!("{id}: {}", error.kind()));
    }

    fn pass_failed(&self, _error: &PassError) {
        *self.aborted.lock().unwrap() = true;
    }
}

/// In-memory redb storage whose writes start failing once `failing` is set.
#[derive(Debug)]
struct FlakyBackend {
    inner: InMemoryBackend,
    failing: Arc<AtomicBool>,
}

impl FlakyBackend {
    fn new(failing: Arc<AtomicBool>) -> Self {
        Self {
            inner: InMemoryBackend::new(),
            failing,
        }
    }

    fn check(&self) -> Result<(), io::Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::other("disk full"));
        }
        Ok(())
    }
}

impl StorageBackend for FlakyBackend {
    fn len(&self) -> Result<u64, io::Error> {
        self.inner.len()
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<(), io::Error> {
        self.inner.read(offset, out)
    }

    fn set_len(&self, len: u64) -> Result<(), io::Error> {
        self.check()?;
        self.inner.set_len(len)
    }

    fn sync_data(&self) -> Result<(), io::Error> {
        self.check()?;
        self.inner.sync_data()
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<(), io::Error> {
        self.check()?;
        self.inner.write(offset, data)
    }
}

// ── Harness ───────────────────────────────────────────────────────

struct Harness {
    platform: Arc<FakePlatform>,
    actuator: Arc<FakeActuator>,
    clock: Arc<ManualClock>,
    observer: Arc<RecordingObserver>,
    reconciler: Reconciler<Arc<FakePlatform>, Arc<FakeActuator>>,
}

fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// `{min:1, max:10, up:70, down:30, delta:5, cooldown:5m}`
fn reference_policy() -> PolicySet {
    PolicySet::new(ScalingPolicy::default(), Default::default()).unwrap()
}

fn harness_with_store(platform: Arc<FakePlatform>, store: StateStore) -> Harness {
    let actuator = FakeActuator::new(platform.clone());
    let clock = Arc::new(ManualClock::new(start()));
    let observer = Arc::new(RecordingObserver::default());
    let reconciler = Reconciler::new(store, reference_policy(), platform.clone(), actuator.clone())
        .with_clock(clock.clone())
        .with_observer(observer.clone())
        .with_settings(ReconcileSettings {
            ignore_exposed: true,
            actuation_timeout: Duration::from_millis(50),
        });
    Harness {
        platform,
        actuator,
        clock,
        observer,
        reconciler,
    }
}

fn harness(platform: Arc<FakePlatform>) -> Harness {
    harness_with_store(platform, StateStore::open_in_memory().unwrap())
}

fn api() -> ServiceIdentity {
    ServiceIdentity::new("shop", "api")
}

fn held(report: &PassReport, reason: HoldReason) -> bool {
    matches!(report.outcome(&api()), Some(ServiceOutcome::Held(r)) if *r == reason)
}

// ── Scenarios ─────────────────────────────────────────────────────

#[tokio::test]
async fn scale_up_then_cooldown_one_minute_later() {
    let h = harness(FakePlatform::with_service("shop/api", 80.0, 2));

    let report = h.reconciler.run_pass().await.unwrap();
    assert!(matches!(
        report.outcome(&api()),
        Some(ServiceOutcome::Scaled { from: 2, to: 3, partial: false })
    ));

    h.clock.advance(Duration::from_secs(60));
    h.platform.set("shop/api", 85.0, 3);
    let report = h.reconciler.run_pass().await.unwrap();

    assert!(held(&report, HoldReason::Cooldown));
    assert_eq!(h.actuator.calls(), vec![("shop/api".to_string(), 3)]);
    // The observation is still recorded during cooldown.
    let state = h.reconciler.store().read(&api());
    assert_eq!(state.last_utilization.map(|u| u.value()), Some(85.0));
}

#[tokio::test]
async fn cooldown_expires_after_window() {
    let h = harness(FakePlatform::with_service("shop/api", 80.0, 2));
    h.reconciler.run_pass().await.unwrap();

    h.clock.advance(Duration::from_secs(5 * 60));
    h.platform.set("shop/api", 90.0, 3);
    let report = h.reconciler.run_pass().await.unwrap();

    assert!(matches!(
        report.outcome(&api()),
        Some(ServiceOutcome::Scaled { from: 3, to: 4, .. })
    ));
}

#[tokio::test]
async fn hysteresis_uses_previous_pass_sample() {
    let h = harness(FakePlatform::with_service("shop/api", 50.0, 2));
    h.reconciler.run_pass().await.unwrap();

    // 50 then 68: between thresholds.
    h.platform.set("shop/api", 68.0, 2);
    let report = h.reconciler.run_pass().await.unwrap();
    assert!(held(&report, HoldReason::Stable));

    // 68 then 72: over the threshold but only a 4 point rise.
    h.platform.set("shop/api", 72.0, 2);
    let report = h.reconciler.run_pass().await.unwrap();
    assert!(held(&report, HoldReason::ScaleUpSuppressedInsufficientRise));
    assert!(h.actuator.calls().is_empty());

    // 72 then 80: rise of 8.
    h.platform.set("shop/api", 80.0, 2);
    let report = h.reconciler.run_pass().await.unwrap();
    assert!(matches!(
        report.outcome(&api()),
        Some(ServiceOutcome::Scaled { to: 3, .. })
    ));
}

#[tokio::test]
async fn no_scale_down_at_the_floor() {
    let h = harness(FakePlatform::with_service("shop/api", 10.0, 1));

    let report = h.reconciler.run_pass().await.unwrap();

    assert!(held(&report, HoldReason::Stable));
    assert!(h.actuator.calls().is_empty());
}

#[tokio::test]
async fn rejected_actuation_leaves_service_out_of_cooldown() {
    let h = harness(FakePlatform::with_service("shop/api", 80.0, 2));
    h.actuator.set_behavior(Behavior::Reject);

    let report = h.reconciler.run_pass().await.unwrap();
    assert_eq!(report.errors, 1);
    assert!(matches!(
        report.outcome(&api()),
        Some(ServiceOutcome::Failed(ServiceError::ActuationFailed(ActuationError::Rejected(_))))
    ));
    assert!(h.reconciler.store().read(&api()).last_scaled_at.is_none());

    // Next pass: still hot and rising, and no cooldown blocks a retry.
    h.actuator.set_behavior(Behavior::Apply);
    h.clock.advance(Duration::from_secs(30));
    h.platform.set("shop/api", 90.0, 2);
    let report = h.reconciler.run_pass().await.unwrap();
    assert!(matches!(
        report.outcome(&api()),
        Some(ServiceOutcome::Scaled { from: 2, to: 3, .. })
    ));
    assert_eq!(h.actuator.calls().len(), 2);
}

#[tokio::test]
async fn timed_out_actuation_is_a_failure() {
    let h = harness(FakePlatform::with_service("shop/api", 80.0, 2));
    h.actuator.set_behavior(Behavior::Hang);

    let report = h.reconciler.run_pass().await.unwrap();

    assert!(matches!(
        report.outcome(&api()),
        Some(ServiceOutcome::Failed(ServiceError::ActuationFailed(ActuationError::Timeout(_))))
    ));
    assert!(h.reconciler.store().read(&api()).last_scaled_at.is_none());
    assert_eq!(*h.observer.failures.lock().unwrap(), vec!["shop/api: actuation_failed"]);
}

#[tokio::test]
async fn partial_actuation_still_enters_cooldown() {
    let h = harness(FakePlatform::with_service("shop/api", 80.0, 2));
    h.actuator.set_behavior(Behavior::Partial);

    let report = h.reconciler.run_pass().await.unwrap();
    assert_eq!(report.scaled, 1);
    assert!(matches!(
        report.outcome(&api()),
        Some(ServiceOutcome::Scaled { partial: true, .. })
    ));
    assert_eq!(h.reconciler.store().read(&api()).last_scaled_at, Some(start()));

    h.clock.advance(Duration::from_secs(60));
    h.platform.set("shop/api", 95.0, 2);
    let report = h.reconciler.run_pass().await.unwrap();
    assert!(held(&report, HoldReason::Cooldown));
}

#[tokio::test]
async fn inventory_failure_aborts_the_pass() {
    let h = harness(FakePlatform::with_service("shop/api", 80.0, 2));
    *h.platform.inventory_down.lock().unwrap() = true;

    let result = h.reconciler.run_pass().await;

    assert!(matches!(result, Err(PassError::Inventory(_))));
    assert!(*h.observer.aborted.lock().unwrap());
    assert!(h.actuator.calls().is_empty());
    assert!(h.reconciler.store().list().unwrap().is_empty());
}

#[tokio::test]
async fn one_failing_service_does_not_stop_the_others() {
    let platform = FakePlatform::with_service("shop/api", 80.0, 2);
    platform.add("shop/worker", 10.0, 4);
    platform.add("blog/web", 50.0, 1);
    platform.cpu.lock().unwrap().remove("shop/api");
    let h = harness(platform);

    let report = h.reconciler.run_pass().await.unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.errors, 1);
    assert_eq!(report.processed, 2);
    assert_eq!(report.scaled, 1);
    assert_eq!(h.actuator.calls(), vec![("shop/worker".to_string(), 3)]);
    let decisions = h.observer.decisions.lock().unwrap();
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[1], ("blog/web".to_string(), Decision::Hold(HoldReason::Stable)));
}

#[tokio::test]
async fn cooldown_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.redb");
    let platform = FakePlatform::with_service("shop/api", 80.0, 2);

    {
        let h = harness_with_store(platform.clone(), StateStore::open(&db_path).unwrap());
        let report = h.reconciler.run_pass().await.unwrap();
        assert_eq!(report.scaled, 1);
    }

    // A fresh process one minute later sees the persisted cooldown marker.
    let h = harness_with_store(platform, StateStore::open(&db_path).unwrap());
    h.clock.advance(Duration::from_secs(60));
    h.platform.set("shop/api", 99.0, 3);
    let report = h.reconciler.run_pass().await.unwrap();

    assert!(held(&report, HoldReason::Cooldown));
    assert!(h.actuator.calls().is_empty());
}

#[tokio::test]
async fn persistence_failure_is_isolated_to_its_service() {
    let platform = FakePlatform::with_service("shop/api", 80.0, 2);
    platform.add("shop/batch", 90.0, 1);
    platform.add("blog/web", 95.0, 1);
    platform.services.lock().unwrap()[2].exposed = true;

    let failing = Arc::new(AtomicBool::new(false));
    let store = StateStore::open_with_backend(FlakyBackend::new(failing.clone())).unwrap();
    let h = harness_with_store(platform, store);
    // The disk fills up while shop/batch is being scaled.
    h.actuator.trip_on("shop/batch", failing.clone());

    let report = h.reconciler.run_pass().await.unwrap();

    assert!(matches!(
        report.outcome(&api()),
        Some(ServiceOutcome::Scaled { from: 2, to: 3, partial: false })
    ));
    let batch = ServiceIdentity::new("shop", "batch");
    assert!(matches!(
        report.outcome(&batch),
        Some(ServiceOutcome::Failed(ServiceError::Persistence(_)))
    ));
    assert!(matches!(
        report.outcome(&ServiceIdentity::new("blog", "web")),
        Some(ServiceOutcome::Ignored(IgnoreReason::Exposed))
    ));
    assert_eq!(report.total, 3);
    assert_eq!(report.processed, 2);
    assert_eq!(report.scaled, 1);
    assert_eq!(report.ignored, 1);
    assert_eq!(report.errors, 1);

    // The scale request went out, but no cooldown marker was stored.
    assert_eq!(
        h.actuator.calls(),
        vec![("shop/api".to_string(), 3), ("shop/batch".to_string(), 2)]
    );
    assert!(h.reconciler.store().read(&batch).last_scaled_at.is_none());
    assert_eq!(
        *h.observer.failures.lock().unwrap(),
        vec!["shop/batch: persistence_error".to_string()]
    );
}
