//! Core types and traits for the entity mapper.
//!
//! Mappings bind a unique key to a value; a value of the exact form `${other}` is an
//! indirection to another key. Every mutation leaves an [`AuditEventRecord`] behind.

mod audit;
mod dto;
mod mapping;
mod traits;

pub use audit::*;
pub use dto::*;
pub use mapping::*;
pub use traits::*;
