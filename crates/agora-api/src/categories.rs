use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};

use agora_db::directory::NewCategory;
use agora_types::api::{CategoryListResponse, Claims, CreateCategoryRequest, SeedResponse};
use agora_types::models::{Caller, Category};

use crate::error::ApiError;
use crate::state::{AppState, with_db};

pub async fn list_categories(State(state): State<AppState>) -> Result<Json<CategoryListResponse>, ApiError> {
    let categories = with_db(&state, |db| db.list_categories()).await?;
    Ok(Json(CategoryListResponse { categories }))
}

pub async fn create_category(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<CreateCategoryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let Json(req) = body?;
    let caller: Caller = claims.into();
    let new = NewCategory {
        id: req.id,
        name: req.name,
        description: req.description,
        icon: req.icon,
        kind: req.kind,
        is_admin_only: req.is_admin_only,
    };
    let category = with_db(&state, move |db| db.create_category(&caller, new)).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// POST /categories/seed: installs the default forum layout. Idempotent.
pub async fn seed_categories(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SeedResponse>, ApiError> {
    let caller: Caller = claims.into();
    let report = with_db(&state, move |db| db.seed_categories(&caller)).await?;

    let message = if report.categories == 0 && report.threads == 0 {
        "Categories already seeded".to_string()
    } else {
        "Categories seeded successfully".to_string()
    };
    Ok(Json(SeedResponse {
        message,
        categories: report.categories,
        threads: report.threads,
    }))
}
