//! Request and response DTOs for the mapper REST surface and bulk import.

use crate::{AuditEventRecord, Mapping};
use serde::{Deserialize, Serialize};

/// Key/value pair as it appears in an import payload. Any `id` in the payload is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub key: String,
    pub value: String,
}

impl MappingEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Outcome counts of one bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMappingRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Partial update: a missing or blank field keeps the current key/value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMappingRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl UpdateMappingRequest {
    /// Merge this request over the current mapping state.
    pub fn merged_with(&self, current: &Mapping) -> (String, String) {
        let pick = |new: &Option<String>, old: &str| match new {
            Some(v) if !v.trim().is_empty() => v.clone(),
            _ => old.to_string(),
        };
        (pick(&self.key, &current.key), pick(&self.value, &current.value))
    }
}

/// Base response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseResponse<T> {
    #[serde(default = "default_code")]
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

fn default_code() -> i32 {
    200
}

impl<T> BaseResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            message: "Success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

pub type MappingResponse = BaseResponse<Mapping>;
pub type MappingListResponse = BaseResponse<Vec<Mapping>>;
pub type MappedValueResponse = BaseResponse<String>;
pub type ImportResponse = BaseResponse<ImportReport>;
pub type AuditListResponse = BaseResponse<Vec<AuditEventRecord>>;
