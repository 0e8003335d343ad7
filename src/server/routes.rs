/// Health, ledger and audit-trail routes.
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::error::{api_error, bad_request, ApiError};
use super::middleware::LedgerClient;
use super::AppState;
use crate::anchor::{lookup_by_content_hash, LookupResult};
use crate::crypto::hash::is_digest_hex;
use crate::error::AnchorError;
use crate::state::models::{AnchorAuditEntry, AnchorMetadata, AuditFilter, EntityKind, LedgerConfigSnapshot};

// ─── Health ──────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    ledger: bool,
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        ledger: state.ledger.is_some(),
    })
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

// ─── Ledger ──────────────────────────────────────────────

pub fn ledger_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ledger/batches", get(list_batches))
        .route("/api/ledger/batches/{tx_ref}", get(get_batch))
        .route("/api/ledger/value", get(ledger_value))
        .route("/api/ledger/lookup", get(lookup))
        .route("/api/ledger/config", get(ledger_config))
        .route("/api/records/{entity}/{id}/anchor", get(anchor_status))
}

#[derive(Debug, Deserialize)]
struct BatchQuery {
    page: Option<i64>,
    size: Option<i64>,
    entity: Option<String>,
    tx_ref: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchPage {
    total: i64,
    page: i64,
    size: i64,
    items: Vec<AnchorAuditEntry>,
}

fn parse_entity(raw: &str) -> Result<EntityKind, ApiError> {
    raw.parse().map_err(bad_request)
}

/// GET /api/ledger/batches — Audit entries, newest first.
async fn list_batches(
    State(state): State<Arc<AppState>>,
    Query(q): Query<BatchQuery>,
) -> Result<Json<BatchPage>, ApiError> {
    let entity = q.entity.as_deref().map(parse_entity).transpose()?;

    let filter = AuditFilter {
        entity,
        ledger_tx_ref: q.tx_ref.filter(|t| !t.is_empty()),
        page: q.page.unwrap_or(1),
        size: q.size.unwrap_or(AuditFilter::DEFAULT_SIZE),
    }
    .normalized();

    let (total, items) = state
        .store
        .list_audit_entries(&filter)
        .await
        .map_err(api_error)?;

    Ok(Json(BatchPage {
        total,
        page: filter.page,
        size: filter.size,
        items,
    }))
}

/// GET /api/ledger/batches/{tx_ref}
async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(tx_ref): Path<String>,
) -> Result<Json<AnchorAuditEntry>, ApiError> {
    state
        .store
        .audit_entry(&tx_ref)
        .await
        .map_err(api_error)?
        .map(Json)
        .ok_or_else(|| api_error(AnchorError::NotFound(format!("batch {tx_ref}"))))
}

#[derive(Debug, Deserialize)]
struct ValueQuery {
    key: String,
}

#[derive(Debug, Serialize)]
struct ValueResponse {
    key: String,
    values: Vec<String>,
    block_number: String,
}

/// GET /api/ledger/value?key= — Raw contract read.
async fn ledger_value(
    LedgerClient(ledger): LedgerClient,
    Query(q): Query<ValueQuery>,
) -> Result<Json<ValueResponse>, ApiError> {
    if q.key.is_empty() {
        return Err(bad_request("key must not be empty"));
    }

    let value = ledger.get(&q.key).await.map_err(api_error)?;

    Ok(Json(ValueResponse {
        key: q.key,
        values: value.values,
        block_number: value.block_number.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
struct LookupQuery {
    content_hash: String,
}

/// GET /api/ledger/lookup?content_hash= — Values stored under the batch
/// that anchored this hash.
async fn lookup(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LookupQuery>,
) -> Result<Json<LookupResult>, ApiError> {
    let content_hash = q.content_hash.to_ascii_lowercase();
    if !is_digest_hex(&content_hash) {
        return Err(bad_request("content_hash must be 64 hex characters"));
    }

    lookup_by_content_hash(&*state.store, state.ledger.as_deref(), &content_hash)
        .await
        .map(Json)
        .map_err(api_error)
}

/// GET /api/ledger/config — Redacted settings recorded at startup.
async fn ledger_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LedgerConfigSnapshot>, ApiError> {
    state
        .store
        .ledger_config()
        .await
        .map_err(api_error)?
        .map(Json)
        .ok_or_else(|| api_error(AnchorError::NotFound("ledger configuration".into())))
}

#[derive(Debug, Serialize)]
struct AnchorStatusResponse {
    entity: EntityKind,
    id: i64,
    #[serde(flatten)]
    anchor: AnchorMetadata,
}

/// GET /api/records/{entity}/{id}/anchor
async fn anchor_status(
    State(state): State<Arc<AppState>>,
    Path((entity, id)): Path<(String, i64)>,
) -> Result<Json<AnchorStatusResponse>, ApiError> {
    let entity = parse_entity(&entity)?;

    let anchor = state
        .store
        .anchor_status(entity, id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| api_error(AnchorError::NotFound(format!("{entity} {id}"))))?;

    Ok(Json(AnchorStatusResponse { entity, id, anchor }))
}
