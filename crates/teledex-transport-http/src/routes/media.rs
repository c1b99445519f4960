use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use teledex_core::catalog::{MediaBulkUpdate, MediaDraft, MediaPatch, MediaRecord, PendingSummary};
use tracing::instrument;

use super::{ApiJson, ApiResponse};
use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Body of `POST /api/media/delete-many`.
#[derive(Debug, Deserialize)]
pub struct DeleteManyRequest {
    /// Record ids
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Body of `POST /api/media/you-may-like/:media_type`.
#[derive(Debug, Deserialize)]
pub struct RelatedRequest {
    /// Id of the record being viewed
    #[serde(default)]
    pub exclude: String,
}

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/api/media/new", post(create))
        .route("/api/media/approved", get(list_approved))
        .route("/api/media/pending", get(list_pending))
        .route("/api/media/pending/:media_type", get(list_pending_by_type))
        .route("/api/media/delete-many", post(delete_many))
        .route("/api/media/update-many", post(update_many))
        .route("/api/media/you-may-like/:media_type", post(related))
        .route(
            "/api/media/:id",
            get(get_media).put(update_media).delete(delete_media),
        )
}

/// Submit a record for moderation.
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    ApiJson(draft): ApiJson<MediaDraft>,
) -> Result<(StatusCode, Json<ApiResponse<MediaRecord>>), ApiError> {
    let record = state.catalog.create(draft).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Media created successfully", record),
    ))
}

/// Public listing.
#[instrument(skip_all)]
pub async fn list_approved(State(state): State<AppState>) -> ApiResult<Vec<MediaRecord>> {
    Ok(ApiResponse::data(state.catalog.list_approved().await?))
}

/// Moderation queue across all types.
#[instrument(skip_all)]
pub async fn list_pending(State(state): State<AppState>) -> ApiResult<Vec<PendingSummary>> {
    Ok(ApiResponse::data(state.catalog.list_pending(None).await?))
}

/// Moderation queue of one type.
#[instrument(skip(state))]
pub async fn list_pending_by_type(
    State(state): State<AppState>,
    Path(media_type): Path<String>,
) -> ApiResult<Vec<PendingSummary>> {
    Ok(ApiResponse::data(
        state.catalog.list_pending(Some(&media_type)).await?,
    ))
}

/// Fetch one record.
#[instrument(skip(state))]
pub async fn get_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<MediaRecord> {
    Ok(ApiResponse::data(state.catalog.get(&id).await?))
}

/// Apply a whitelisted patch.
#[instrument(skip(state, patch))]
pub async fn update_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<MediaPatch>,
) -> ApiResult<MediaRecord> {
    let record = state.catalog.update(&id, &patch).await?;
    Ok(ApiResponse::with_message("Media updated successfully", record))
}

/// Delete a record and its stored assets.
#[instrument(skip(state))]
pub async fn delete_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.catalog.delete(&id).await?;
    Ok(ApiResponse::message("Media and image deleted successfully"))
}

/// Delete several records.
#[instrument(skip_all)]
pub async fn delete_many(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DeleteManyRequest>,
) -> ApiResult<()> {
    let deleted = state.catalog.delete_many(&request.ids).await?;
    Ok(ApiResponse::message(format!(
        "{deleted} media items and images deleted successfully"
    )))
}

/// Apply several patches at once.
#[instrument(skip_all)]
pub async fn update_many(
    State(state): State<AppState>,
    ApiJson(updates): ApiJson<Vec<MediaBulkUpdate>>,
) -> ApiResult<()> {
    let modified = state.catalog.update_many(&updates).await?;
    Ok(ApiResponse::message(format!(
        "{modified} media items updated successfully"
    )))
}

/// Records of the same type as the one being viewed.
#[instrument(skip(state, request))]
pub async fn related(
    State(state): State<AppState>,
    Path(media_type): Path<String>,
    ApiJson(request): ApiJson<RelatedRequest>,
) -> ApiResult<Vec<MediaRecord>> {
    Ok(ApiResponse::data(
        state.catalog.related(&media_type, &request.exclude).await?,
    ))
}
