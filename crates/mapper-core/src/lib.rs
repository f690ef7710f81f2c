//! Mapping resolution and consistency engine.
//!
//! [`LinkResolver`] follows `${key}` indirections, [`MappingManager`] guards key uniqueness,
//! and [`MappingService`] is the audited facade handed to collaborators.

mod manager;
mod resolver;
mod service;

pub use manager::MappingManager;
pub use mapper_types::{CycleError, EntityMapper, MappingError};
pub use resolver::{link_target, LinkResolver};
pub use service::MappingService;
