//! Mapping store implementations.

mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use mapper_types::{Mapping, MappingId, MappingStore, MappingStoreError};
pub use memory::InMemoryMappingStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteMappingStore;
