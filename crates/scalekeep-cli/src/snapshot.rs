//! Snapshot-backed upstream source.
//!
//! A snapshot is a JSON file of raw platform responses captured by whatever
//! wraps the pass (a cron job, a CI step):
//!
//! ```json
//! {
//!   "projects": { "result": { "data": { "json": [ ... ] } } },
//!   "services": {
//!     "shop/api": {
//!       "stats": { "result": { "data": { "json": { "cpu": 81.2 } } } },
//!       "inspect": { "result": { "data": { "json": { "deploy": { "replicas": 2 } } } } },
//!       "exposed_ports": { "result": { "data": { "json": [] } } }
//!     }
//!   }
//! }
//! ```
//!
//! Every document goes through [`scalekeep_autoscale::adapter`].

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;

use scalekeep_autoscale::adapter;
use scalekeep_autoscale::{Inventory, InventoryEntry, MetricsSource, ReplicaSource, SourceError};
use scalekeep_core::{ReplicaCount, ServiceIdentity};

#[derive(Debug, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub projects: Value,
    #[serde(default)]
    pub services: HashMap<String, ServiceSnapshot>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServiceSnapshot {
    pub stats: Option<Value>,
    #[serde(alias = "replicas")]
    pub inspect: Option<Value>,
    pub exposed_ports: Option<Value>,
}

pub struct SnapshotSource {
    snapshot: Snapshot,
}

impl SnapshotSource {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse snapshot {}", path.display()))?;
        Ok(Self { snapshot })
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    fn service(&self, id: &ServiceIdentity) -> Option<&ServiceSnapshot> {
        self.snapshot.services.get(&id.to_string())
    }
}

impl Inventory for SnapshotSource {
    async fn list_services(&self) -> Result<Vec<InventoryEntry>, SourceError> {
        if self.snapshot.projects.is_null() {
            return Err(SourceError::Unavailable("snapshot has no projects listing".to_string()));
        }
        let ids = adapter::parse_inventory(&self.snapshot.projects)?;
        Ok(ids
            .into_iter()
            .map(|id| {
                let exposed = self
                    .service(&id)
                    .and_then(|svc| svc.exposed_ports.as_ref())
                    .is_some_and(adapter::parse_exposed);
                InventoryEntry::new(id, exposed)
            })
            .collect())
    }
}

impl MetricsSource for SnapshotSource {
    async fn utilization(&self, id: &ServiceIdentity) -> Result<Option<f64>, SourceError> {
        match self.service(id).and_then(|svc| svc.stats.as_ref()) {
            Some(stats) => adapter::parse_utilization(stats),
            None => Err(SourceError::Unavailable("no stats captured".to_string())),
        }
    }
}

impl ReplicaSource for SnapshotSource {
    async fn replicas(&self, id: &ServiceIdentity) -> Result<ReplicaCount, SourceError> {
        match self.service(id).and_then(|svc| svc.inspect.as_ref()) {
            Some(inspect) => adapter::parse_replicas(inspect),
            None => Err(SourceError::Unavailable("no inspection captured".to_string())),
        }
    }
}
