//! StateStore — redb-backed persistence of per-service scaling state.
//!
//! One table, one JSON record per service. Writes go through a single
//! read-modify-write transaction per call so `record_observation` and
//! `record_scale` each touch only their own field. Commits use redb's
//! default immediate durability.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use redb::{Database, ReadOnlyDatabase, ReadableDatabase, ReadableTable, StorageBackend};
use tracing::{debug, warn};

use scalekeep_core::{ServiceIdentity, UtilizationSample};

use crate::error::{StateError, StateResult};
use crate::tables::SERVICE_STATE;
use crate::types::{ServiceRecord, ServiceState};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    ///
    /// Missing parent directories are created.
    pub fn open(path: &Path) -> StateResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(map_err!(Open))?;
        }
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let store = Self::open_with_backend(redb::backends::InMemoryBackend::new())?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Open a store over any redb storage backend.
    pub fn open_with_backend(backend: impl StorageBackend) -> StateResult<Self> {
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SERVICE_STATE).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Read the stored record, surfacing storage errors.
    ///
    /// Returns the zero-value record for a service never written.
    pub fn try_read(&self, id: &ServiceIdentity) -> StateResult<ServiceState> {
        let key = id.table_key();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVICE_STATE).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))
            }
            None => Ok(ServiceState::default()),
        }
    }

    /// Read the stored record for `id`.
    ///
    /// Never fails: an unreadable record is logged and treated as absent.
    pub fn read(&self, id: &ServiceIdentity) -> ServiceState {
        self.try_read(id).unwrap_or_else(|e| {
            warn!(service = %id, error = %e, "state unreadable, treating as never observed");
            ServiceState::default()
        })
    }

    /// Persist the latest utilization; `last_scaled_at` is left untouched.
    pub fn record_observation(
        &self,
        id: &ServiceIdentity,
        utilization: UtilizationSample,
    ) -> StateResult<ServiceState> {
        let state = self.update(id, |state| state.last_utilization = Some(utilization))?;
        debug!(service = %id, cpu = utilization.value(), "observation recorded");
        Ok(state)
    }

    /// Persist the time of an accepted scale action; `last_utilization` is
    /// left untouched.
    pub fn record_scale(&self, id: &ServiceIdentity, at: DateTime<Utc>) -> StateResult<ServiceState> {
        let state = self.update(id, |state| state.last_scaled_at = Some(at))?;
        debug!(service = %id, %at, "scale recorded");
        Ok(state)
    }

    /// Whether `id` was scaled less than `window` before `now`.
    pub fn is_in_cooldown(&self, id: &ServiceIdentity, now: DateTime<Utc>, window: Duration) -> bool {
        self.read(id).in_cooldown(now, window)
    }

    /// All stored records in key order.
    pub fn list(&self) -> StateResult<Vec<ServiceRecord>> {
        list_records(self.db.as_ref())
    }

    /// Records of the store at `path`, opened read-only. Nothing is created
    /// or written, not even the table.
    pub fn read_snapshot(path: &Path) -> StateResult<Vec<ServiceRecord>> {
        let db = ReadOnlyDatabase::open(path).map_err(map_err!(Open))?;
        list_records(&db)
    }

    /// Read-modify-write a single record inside one write transaction.
    fn update(
        &self,
        id: &ServiceIdentity,
        apply: impl FnOnce(&mut ServiceState),
    ) -> StateResult<ServiceState> {
        let key = id.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let state = {
            let mut table = txn.open_table(SERVICE_STATE).map_err(map_err!(Table))?;
            let mut state: ServiceState = match table.get(key.as_str()).map_err(map_err!(Read))? {
                // A corrupt record is overwritten rather than blocking writes forever.
                Some(guard) => serde_json::from_slice(guard.value()).unwrap_or_default(),
                None => ServiceState::default(),
            };
            apply(&mut state);
            let value = serde_json::to_vec(&state).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            state
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(state)
    }
}

fn list_records(db: &impl ReadableDatabase) -> StateResult<Vec<ServiceRecord>> {
    let txn = db.begin_read().map_err(map_err!(Transaction))?;
    let table = txn.open_table(SERVICE_STATE).map_err(map_err!(Table))?;
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (key, value) = entry.map_err(map_err!(Read))?;
        let id: ServiceIdentity = match key.value().parse() {
            Ok(id) => id,
            Err(e) => {
                warn!(key = key.value(), error = %e, "skipping record with malformed key");
                continue;
            }
        };
        let state: ServiceState =
            serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
        results.push(ServiceRecord { id, state });
    }
    Ok(results)
}
