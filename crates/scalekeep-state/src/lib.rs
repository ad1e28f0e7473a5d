//! scalekeep-state — durable per-service scaling state.
//!
//! Backed by [redb](https://docs.rs/redb). Each service identity maps to a
//! single JSON-serialized [`ServiceState`] record holding the last accepted
//! scale timestamp and the last observed utilization. Every write commits
//! before returning, so a crash right after a scale never loses the
//! cooldown marker.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
