//! Entity mapper REST API server.

use mapper_api::config::ApiConfig;
use mapper_api::server::{self, AppState};
use mapper_api::settings::InMemorySettingsStore;
use mapper_audit::{
    DefaultAuditJournal, InMemoryAuditRecordStorage, JsonlAuditRecordStorage,
};
use mapper_core::MappingService;
use mapper_store::InMemoryMappingStore;
use mapper_types::{AuditRecordStorage, MappingStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Stores = (
    Arc<dyn MappingStore>,
    Arc<dyn AuditRecordStorage + Send + Sync>,
);

#[cfg(feature = "sqlite")]
fn sqlite_stores(config: &ApiConfig) -> Result<Option<Stores>, Box<dyn std::error::Error + Send + Sync>> {
    let Some(ref path) = config.sqlite_path else {
        return Ok(None);
    };
    let mappings = mapper_store::SqliteMappingStore::new(path)?;
    let audit = mapper_audit::SqliteAuditRecordStorage::new(path)?;
    tracing::info!(path = %path.display(), "using sqlite storage");
    Ok(Some((Arc::new(mappings), Arc::new(audit))))
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_stores(config: &ApiConfig) -> Result<Option<Stores>, Box<dyn std::error::Error + Send + Sync>> {
    if config.sqlite_path.is_some() {
        tracing::warn!("MAPPER_SQLITE_PATH is set but the sqlite feature is disabled; ignoring");
    }
    Ok(None)
}

fn default_stores(config: &ApiConfig) -> Stores {
    let audit: Arc<dyn AuditRecordStorage + Send + Sync> = match config.audit_log {
        Some(ref path) => {
            tracing::info!(path = %path.display(), "audit records go to jsonl file");
            Arc::new(JsonlAuditRecordStorage::new(path))
        }
        None => Arc::new(InMemoryAuditRecordStorage::new()),
    };
    (Arc::new(InMemoryMappingStore::new()), audit)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ApiConfig::from_env()?;
    let (mappings, audit) = match sqlite_stores(&config)? {
        Some(stores) => stores,
        None => default_stores(&config),
    };

    let journal = Arc::new(DefaultAuditJournal::new(audit));
    let mapper = Arc::new(MappingService::new(mappings, journal));
    let state = Arc::new(AppState {
        mapper,
        settings: Arc::new(InMemorySettingsStore::new()),
        default_events_limit: config.default_events_limit,
    });

    let app = server::router(state);
    tracing::info!("mapper API listening on {}", config.listen);
    axum::serve(
        tokio::net::TcpListener::bind(config.listen).await?,
        app.into_make_service(),
    )
    .await?;
    Ok(())
}
