//! Collaborator interfaces the reconciler drives.
//!
//! Inventory, metrics and replica counts usually come from the same
//! upstream platform API, so one type often implements all three.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use scalekeep_core::{ReplicaCount, ServiceIdentity};

/// A service eligible for evaluation, as reported by the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub id: ServiceIdentity,
    /// Network-reachable services are skipped when `ignore_exposed` is on.
    pub exposed: bool,
}

impl InventoryEntry {
    pub fn new(id: ServiceIdentity, exposed: bool) -> Self {
        Self { id, exposed }
    }
}

/// Failure to obtain data from an upstream source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    /// The source could not be reached or returned nothing usable.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The source answered with data of the wrong shape or type.
    #[error("invalid data: {0}")]
    Invalid(String),
}

pub trait Inventory {
    fn list_services(&self) -> impl Future<Output = Result<Vec<InventoryEntry>, SourceError>> + Send;
}

pub trait MetricsSource {
    /// Raw CPU utilization for `id`. `Ok(None)` means the source answered
    /// but carried no sample.
    fn utilization(
        &self,
        id: &ServiceIdentity,
    ) -> impl Future<Output = Result<Option<f64>, SourceError>> + Send;
}

pub trait ReplicaSource {
    fn replicas(
        &self,
        id: &ServiceIdentity,
    ) -> impl Future<Output = Result<ReplicaCount, SourceError>> + Send;
}

/// How far an accepted scale request got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuationOutcome {
    /// Configuration updated and activated.
    Applied,
    /// Configuration updated but activation failed. Still starts the
    /// cooldown window.
    Partial { reason: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActuationError {
    #[error("scale request rejected: {0}")]
    Rejected(String),

    #[error("scale request failed: {0}")]
    Transport(String),

    #[error("scale request timed out after {0:?}")]
    Timeout(Duration),
}

/// Applies a replica count to a service.
pub trait Actuator {
    fn scale(
        &self,
        id: &ServiceIdentity,
        replicas: ReplicaCount,
    ) -> impl Future<Output = Result<ActuationOutcome, ActuationError>> + Send;
}

// Shared handles forward to the inner value, so callers can keep a clone
// of a source or actuator after handing it to the reconciler.

impl<T: Inventory> Inventory for Arc<T> {
    fn list_services(&self) -> impl Future<Output = Result<Vec<InventoryEntry>, SourceError>> + Send {
        (**self).list_services()
    }
}

impl<T: MetricsSource> MetricsSource for Arc<T> {
    fn utilization(
        &self,
        id: &ServiceIdentity,
    ) -> impl Future<Output = Result<Option<f64>, SourceError>> + Send {
        (**self).utilization(id)
    }
}

impl<T: ReplicaSource> ReplicaSource for Arc<T> {
    fn replicas(
        &self,
        id: &ServiceIdentity,
    ) -> impl Future<Output = Result<ReplicaCount, SourceError>> + Send {
        (**self).replicas(id)
    }
}

impl<T: Actuator> Actuator for Arc<T> {
    fn scale(
        &self,
        id: &ServiceIdentity,
        replicas: ReplicaCount,
    ) -> impl Future<Output = Result<ActuationOutcome, ActuationError>> + Send {
        (**self).scale(id, replicas)
    }
}
