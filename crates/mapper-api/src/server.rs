//! Axum server and routes.

use crate::settings::{MapperSettings, SettingsStore};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use mapper_types::{
    AuditEventKind, AuditJournalFilter, BaseResponse, CreateMappingRequest, EntityMapper,
    Initiator, MappingEntry, MappingError, MappingId, UpdateMappingRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Header carrying the acting identity for mutations.
pub const INITIATOR_HEADER: &str = "x-initiator";

pub struct AppState {
    pub mapper: Arc<dyn EntityMapper + Send + Sync>,
    pub settings: Arc<dyn SettingsStore + Send + Sync>,
    pub default_events_limit: i64,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/mapping", get(handle_list).post(handle_create))
        .route("/mapping/value", get(handle_mapped_value))
        .route(
            "/mapping/:id",
            get(handle_get).put(handle_update).delete(handle_delete),
        )
        .route("/import", post(handle_import))
        .route("/audit/records", get(handle_audit_records))
        .route("/settings", get(handle_get_settings).put(handle_put_settings))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn reply<T: Serialize>(status: StatusCode, body: BaseResponse<T>) -> Response {
    (status, Json(body)).into_response()
}

fn ok<T: Serialize>(data: T) -> Response {
    reply(StatusCode::OK, BaseResponse::ok(data))
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    reply::<()>(status, BaseResponse::error(status.as_u16() as i32, message))
}

/// Cycles come back as 409 with the visited chain in `data`.
fn mapping_error(e: MappingError) -> Response {
    let status = match &e {
        MappingError::Conflict(_) | MappingError::Cycle(_) => StatusCode::CONFLICT,
        MappingError::NotFoundById(_) | MappingError::NotFoundByKey(_) => StatusCode::NOT_FOUND,
        MappingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    match e {
        MappingError::Cycle(cycle) => reply(
            status,
            BaseResponse {
                code: status.as_u16() as i32,
                message: cycle.to_string(),
                data: Some(cycle.chain),
            },
        ),
        other => fail(status, other.to_string()),
    }
}

fn initiator(headers: &HeaderMap) -> Result<Initiator, Response> {
    headers
        .get(INITIATOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(Initiator::from)
        .ok_or_else(|| {
            fail(
                StatusCode::BAD_REQUEST,
                format!("{} header is required", INITIATOR_HEADER),
            )
        })
}

fn parse_id(raw: &str) -> Result<MappingId, Response> {
    raw.trim()
        .parse::<i64>()
        .map(MappingId)
        .map_err(|_| fail(StatusCode::BAD_REQUEST, format!("invalid mapping id: {}", raw)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub prefix: Option<String>,
}

async fn handle_list(State(state): State<Arc<AppState>>, Query(q): Query<ListQuery>) -> Response {
    let res = match q.prefix.as_deref().filter(|p| !p.is_empty()) {
        Some(prefix) => state.mapper.get_mapped_values_like(prefix).await,
        None => state.mapper.get_mapped_values().await,
    };
    match res {
        Ok(mappings) => ok(mappings),
        Err(e) => mapping_error(e),
    }
}

async fn handle_get(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    match state.mapper.get_mapping_by_id(id).await {
        Ok(Some(mapping)) => ok(mapping),
        Ok(None) => mapping_error(MappingError::NotFoundById(id)),
        Err(e) => mapping_error(e),
    }
}

async fn handle_create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateMappingRequest>,
) -> Response {
    let who = match initiator(&headers) {
        Ok(who) => who,
        Err(res) => return res,
    };
    if req.key.trim().is_empty() || req.value.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "key and value are required");
    }
    match state.mapper.add_mapping(&who, &req.key, &req.value).await {
        Ok(mapping) => ok(mapping),
        Err(e) => mapping_error(e),
    }
}

async fn handle_update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateMappingRequest>,
) -> Response {
    let who = match initiator(&headers) {
        Ok(who) => who,
        Err(res) => return res,
    };
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    let current = match state.mapper.get_mapping_by_id(id).await {
        Ok(Some(current)) => current,
        Ok(None) => return mapping_error(MappingError::NotFoundById(id)),
        Err(e) => return mapping_error(e),
    };
    let (key, value) = req.merged_with(&current);
    match state.mapper.update_mapping(&who, id, &key, &value).await {
        Ok(mapping) => ok(mapping),
        Err(e) => mapping_error(e),
    }
}

/// Unknown ids succeed without effect.
async fn handle_delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let who = match initiator(&headers) {
        Ok(who) => who,
        Err(res) => return res,
    };
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    let res = match state.mapper.get_mapping_by_id(id).await {
        Ok(Some(mapping)) => state.mapper.remove_mapping(&who, &mapping.key).await,
        Ok(None) => Ok(()),
        Err(e) => Err(e),
    };
    match res {
        Ok(()) => ok(id),
        Err(e) => mapping_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ValueQuery {
    #[serde(default)]
    pub key: Option<String>,
}

async fn handle_mapped_value(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ValueQuery>,
) -> Response {
    let Some(key) = q.key.filter(|k| !k.is_empty()) else {
        return fail(StatusCode::BAD_REQUEST, "key is required");
    };
    match state.mapper.get_mapped_value(&key).await {
        Ok(Some(value)) => ok(value),
        Ok(None) => mapping_error(MappingError::NotFoundByKey(key)),
        Err(e) => mapping_error(e),
    }
}

async fn handle_import(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(entries): Json<Vec<MappingEntry>>,
) -> Response {
    let who = match initiator(&headers) {
        Ok(who) => who,
        Err(res) => return res,
    };
    match state.mapper.import_mappings(&who, &entries).await {
        Ok(report) => ok(report),
        Err(e) => mapping_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecordsQuery {
    #[serde(default)]
    pub mapping_id: Option<i64>,
    #[serde(default)]
    pub initiator: Option<String>,
    /// `yyyyMMdd`, UTC midnight.
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub events_limit: Option<i64>,
    #[serde(default)]
    pub event: Option<String>,
}

fn parse_day(raw: &str) -> Result<DateTime<Utc>, Response> {
    NaiveDate::parse_from_str(raw.trim(), "%Y%m%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            fail(
                StatusCode::BAD_REQUEST,
                format!("invalid date, expected yyyyMMdd: {}", raw),
            )
        })
}

impl AuditRecordsQuery {
    fn to_filter(&self, default_limit: i64) -> Result<AuditJournalFilter, Response> {
        let mut builder = AuditJournalFilter::builder()
            .with_events_limit(self.events_limit.unwrap_or(default_limit));
        if let Some(id) = self.mapping_id {
            builder = builder.for_id(MappingId(id));
        }
        if let Some(ref who) = self.initiator {
            builder = builder.by_initiator(who.as_str());
        }
        if let Some(raw) = self.start_date.as_deref().filter(|s| !s.is_empty()) {
            builder = builder.start_from_date(parse_day(raw)?);
        }
        if let Some(raw) = self.end_date.as_deref().filter(|s| !s.is_empty()) {
            builder = builder.before_date(parse_day(raw)?);
        }
        if let Some(raw) = self.event.as_deref().filter(|s| !s.is_empty()) {
            let kind = raw
                .parse::<AuditEventKind>()
                .map_err(|e| fail(StatusCode::BAD_REQUEST, e.to_string()))?;
            builder = builder.by_event(kind);
        }
        builder
            .build()
            .map_err(|e| fail(StatusCode::BAD_REQUEST, e.to_string()))
    }
}

/// Records are displayed oldest-first.
async fn handle_audit_records(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AuditRecordsQuery>,
) -> Response {
    let filter = match q.to_filter(state.default_events_limit) {
        Ok(filter) => filter,
        Err(res) => return res,
    };
    match state.mapper.get_audit_events(&filter).await {
        Ok(mut records) => {
            records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
            ok(records)
        }
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn handle_get_settings(State(state): State<Arc<AppState>>) -> Response {
    match MapperSettings::load(state.settings.as_ref()).await {
        Ok(settings) => ok(settings),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn handle_put_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(settings): Json<MapperSettings>,
) -> Response {
    let who = match initiator(&headers) {
        Ok(who) => who,
        Err(res) => return res,
    };
    match settings.save(state.settings.as_ref()).await {
        Ok(()) => {
            tracing::info!(
                initiator = %who,
                mappings_enabled_in_projects = settings.mappings_enabled_in_projects,
                "mapper settings saved"
            );
            ok(settings)
        }
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn handle_health() -> &'static str {
    "ok"
}
