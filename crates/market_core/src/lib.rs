//! Marketplace catalog core.
//! Persists marketplace apps and the marketplaces that list them, and owns
//! every catalog invariant: name uniqueness, non-empty marketplace
//! protection, the canonical record round-trip and the write-authority gate.

pub mod codec;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use codec::{DecodeError, ValidationError};
pub use config::{ClusterRole, ConfigError, CoreConfig, PoolConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::app::{App, AppState, StateTransitionError};
pub use model::attributes::AttributeBag;
pub use model::entry::{CatalogEntry, EntryKind};
pub use model::marketplace::Marketplace;
pub use model::name::NameError;
pub use model::owner::Owner;
pub use model::permissions::{Permissions, DEFAULT_UMASK};
pub use model::{EntryId, UNALLOCATED_ID};
pub use repo::record_store::{RecordStore, SqliteRecordStore, StoreError, StoredRecord};
pub use service::object_pool::{Completion, ObjectPool, PoolError, PoolResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
