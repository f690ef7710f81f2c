//! Mapping records and identities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable mapping identifier, assigned by the store at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingId(pub i64);

impl MappingId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MappingId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// One key -> value association. Callers always hold copies, never store-internal state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mapping {
    pub id: MappingId,
    pub key: String,
    pub value: String,
}

impl Mapping {
    pub fn new(id: MappingId, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id,
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Opaque identity of whoever performed a mutation (a login, service name, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Initiator(String);

impl Initiator {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Initiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Initiator {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Initiator {
    fn from(s: String) -> Self {
        Self(s)
    }
}
