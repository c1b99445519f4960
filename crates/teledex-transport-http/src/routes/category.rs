use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use teledex_core::catalog::Category;
use tracing::instrument;

use super::{ApiJson, ApiResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// Body naming a single category.
#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    /// Category name
    #[serde(default)]
    pub category: String,
}

/// Body of a rename.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameCategoryRequest {
    /// Current name
    #[serde(default)]
    pub old_category: String,
    /// New name
    #[serde(default)]
    pub new_category: String,
}

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/api/category/new", post(create_category))
        .route(
            "/api/category",
            get(list_categories)
                .put(rename_category)
                .delete(delete_category),
        )
}

/// Create a category.
#[instrument(skip_all)]
pub async fn create_category(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CategoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Category>>), ApiError> {
    let category = state.catalog.create_category(&request.category).await?;
    Ok((StatusCode::CREATED, ApiResponse::data(category)))
}

/// All category names.
#[instrument(skip_all)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    Ok(ApiResponse::data(state.catalog.list_categories().await?))
}

/// Rename a category.
#[instrument(skip_all)]
pub async fn rename_category(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RenameCategoryRequest>,
) -> Result<Json<ApiResponse<Category>>, ApiError> {
    let category = state
        .catalog
        .rename_category(&request.old_category, &request.new_category)
        .await?;
    Ok(ApiResponse::with_message(
        "Category updated successfully",
        category,
    ))
}

/// Delete a category.
#[instrument(skip_all)]
pub async fn delete_category(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CategoryRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.catalog.delete_category(&request.category).await?;
    Ok(ApiResponse::message("Category deleted successfully"))
}
