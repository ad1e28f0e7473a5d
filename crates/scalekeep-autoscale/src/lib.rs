//! scalekeep-autoscale — CPU-driven replica scaling, one pass at a time.
//!
//! A pass walks the service inventory sequentially. For each service it
//! fetches a utilization sample and the current replica count, records the
//! observation, and asks the decision engine what to do:
//!
//! ```text
//! if ignored                               → Hold(ignored_by_config)
//! if in cooldown                           → Hold(cooldown)
//! if cpu >= up   and replicas < max:
//!     no prior or cpu - prior >= delta     → ScaleUp(replicas + 1)
//!     otherwise                            → Hold(scale_up_suppressed_insufficient_rise)
//! if cpu <= down and replicas > min:
//!     no prior or prior - cpu >= delta     → ScaleDown(replicas - 1)
//!     otherwise                            → Hold(scale_down_suppressed_insufficient_drop)
//! otherwise                                → Hold(stable)
//! ```
//!
//! Scale actions go to the [`Actuator`] under a timeout; an accepted action
//! (full or partial) starts the service's cooldown window.

pub mod adapter;
pub mod clock;
pub mod decision;
pub mod observer;
pub mod provider;
pub mod reconciler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{decide, Decision, HoldReason};
pub use observer::{PassObserver, TracingObserver};
pub use provider::{
    ActuationError, ActuationOutcome, Actuator, Inventory, InventoryEntry, MetricsSource,
    ReplicaSource, SourceError,
};
pub use reconciler::{
    IgnoreReason, PassError, PassReport, ReconcileSettings, Reconciler, ServiceError,
    ServiceOutcome, ServiceReport,
};
