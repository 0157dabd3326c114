use anyhow::anyhow;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::instrument;

use crate::modules::cache::ENTRY_RESPONSES_TAG;
use crate::modules::cache::model::{EntryResponse, PutEntryDto, StatsResponse, TenantQuery};
use crate::state::AppState;
use crate::utils::errors::{AppError, ErrorResponse};
use crate::validator::ValidatedJson;

#[utoipa::path(
    get,
    path = "/api/cache/stats",
    responses(
        (status = 200, description = "Cache statistics", body = StatsResponse)
    ),
    tag = "Cache"
)]
#[instrument(skip(state))]
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.cache.stats().into())
}

#[utoipa::path(
    get,
    path = "/api/cache/entries/{key}",
    params(
        ("key" = String, Path, description = "Cache key"),
        TenantQuery
    ),
    responses(
        (status = 200, description = "Cached value", body = EntryResponse),
        (status = 404, description = "Key not cached or expired", body = ErrorResponse)
    ),
    tag = "Cache"
)]
#[instrument(skip(state))]
pub async fn get_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<EntryResponse>, AppError> {
    let value: serde_json::Value = state
        .cache
        .get(&key, &query.scope())
        .await
        .ok_or_else(|| AppError::not_found(anyhow!("No cached entry for key {}", key)))?;

    Ok(Json(EntryResponse {
        key,
        value,
        tenant_id: query.tenant_id,
    }))
}

#[utoipa::path(
    put,
    path = "/api/cache/entries/{key}",
    params(
        ("key" = String, Path, description = "Cache key")
    ),
    request_body = PutEntryDto,
    responses(
        (status = 204, description = "Value cached"),
        (status = 400, description = "Malformed request body", body = ErrorResponse),
        (status = 422, description = "Invalid TTL, tags or tenant", body = ErrorResponse)
    ),
    tag = "Cache"
)]
#[instrument(skip(state, dto))]
pub async fn put_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
    ValidatedJson(dto): ValidatedJson<PutEntryDto>,
) -> StatusCode {
    state.cache.set(&key, &dto.value, &dto.options()).await;
    state.responses.invalidate(ENTRY_RESPONSES_TAG).await;
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    delete,
    path = "/api/cache/entries/{key}",
    params(
        ("key" = String, Path, description = "Cache key"),
        TenantQuery
    ),
    responses(
        (status = 204, description = "Key removed (or was not cached)")
    ),
    tag = "Cache"
)]
#[instrument(skip(state))]
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<TenantQuery>,
) -> StatusCode {
    state.cache.delete(&key, &query.scope()).await;
    state.responses.invalidate(ENTRY_RESPONSES_TAG).await;
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    delete,
    path = "/api/cache/tags/{tag}",
    params(
        ("tag" = String, Path, description = "Tag whose keys to invalidate")
    ),
    responses(
        (status = 204, description = "Tagged keys invalidated")
    ),
    tag = "Cache"
)]
#[instrument(skip(state))]
pub async fn invalidate_tag(State(state): State<AppState>, Path(tag): Path<String>) -> StatusCode {
    state.cache.invalidate_by_tag(&tag).await;
    state.responses.invalidate(ENTRY_RESPONSES_TAG).await;
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    delete,
    path = "/api/cache",
    responses(
        (status = 204, description = "Cache cleared")
    ),
    tag = "Cache"
)]
#[instrument(skip(state))]
pub async fn clear_cache(State(state): State<AppState>) -> StatusCode {
    state.cache.clear().await;
    StatusCode::NO_CONTENT
}
