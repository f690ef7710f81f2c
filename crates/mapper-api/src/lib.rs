//! REST adapter for the entity mapper.

pub mod config;
pub mod server;
pub mod settings;
