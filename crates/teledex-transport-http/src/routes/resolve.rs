use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use teledex_core::assembler::MediaPayload;
use tracing::instrument;

use super::ApiJson;
use crate::error::ApiError;
use crate::state::AppState;

/// Body of a resolution request.
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    /// Any Telegram link form; `link` is accepted as an alias
    #[serde(alias = "link")]
    pub url: String,
}

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/resolve", post(fetch_media))
        .route("/api/fetch-media", post(fetch_media))
}

/// Resolve a link into the assembled metadata payload.
///
/// The payload is returned bare, without the success envelope.
#[instrument(skip_all)]
pub async fn fetch_media(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ResolveRequest>,
) -> Result<Json<MediaPayload>, ApiError> {
    Ok(Json(state.fetcher.fetch(&request.url).await?))
}
