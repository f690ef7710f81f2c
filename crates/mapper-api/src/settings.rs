//! Mapper settings and their name/value persistence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

const MAPPINGS_ENABLED_IN_PROJECTS: &str = "mappingsEnabledInProjects";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapperSettings {
    #[serde(default)]
    pub mappings_enabled_in_projects: bool,
}

impl MapperSettings {
    /// Persisted form. Every field is listed here by name.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        vec![(
            MAPPINGS_ENABLED_IN_PROJECTS.to_string(),
            self.mappings_enabled_in_projects.to_string(),
        )]
    }

    /// Unknown names are ignored; missing or unparsable values keep the default.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut settings = Self::default();
        for (name, value) in pairs {
            if name == MAPPINGS_ENABLED_IN_PROJECTS {
                settings.mappings_enabled_in_projects =
                    value.trim().parse().unwrap_or_default();
            }
        }
        settings
    }

    pub async fn load(store: &(dyn SettingsStore + Send + Sync)) -> Result<Self, SettingsError> {
        let values = store.load_values().await?;
        Ok(Self::from_pairs(
            values.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ))
    }

    pub async fn save(&self, store: &(dyn SettingsStore + Send + Sync)) -> Result<(), SettingsError> {
        store.save_values(self.to_pairs()).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings store error: {0}")]
    Other(String),
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_values(&self) -> Result<Vec<(String, String)>, SettingsError>;

    /// Upserts the given pairs; names not given keep their stored values.
    async fn save_values(&self, values: Vec<(String, String)>) -> Result<(), SettingsError>;
}

#[derive(Default)]
pub struct InMemorySettingsStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn load_values(&self) -> Result<Vec<(String, String)>, SettingsError> {
        let guard = self.values.read().await;
        Ok(guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    async fn save_values(&self, values: Vec<(String, String)>) -> Result<(), SettingsError> {
        self.values.write().await.extend(values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_name_every_field() {
        let s = MapperSettings {
            mappings_enabled_in_projects: true,
        };
        assert_eq!(
            s.to_pairs(),
            vec![("mappingsEnabledInProjects".to_string(), "true".to_string())]
        );
        assert_eq!(
            MapperSettings::from_pairs([("mappingsEnabledInProjects", "true"), ("other", "x")]),
            s
        );
        assert_eq!(
            MapperSettings::from_pairs([("mappingsEnabledInProjects", "yes")]),
            MapperSettings::default()
        );
    }

    #[tokio::test]
    async fn store_round_trip() {
        let store = InMemorySettingsStore::new();
        assert_eq!(
            MapperSettings::load(&store).await.unwrap(),
            MapperSettings::default()
        );
        MapperSettings {
            mappings_enabled_in_projects: true,
        }
        .save(&store)
        .await
        .unwrap();
        assert!(MapperSettings::load(&store).await.unwrap().mappings_enabled_in_projects);
    }
}
