//! redb table definitions for the scalekeep state store.

use redb::TableDefinition;

/// Per-service scaling state keyed by `{project}/{service}`.
pub const SERVICE_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("service_state");
