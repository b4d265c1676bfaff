use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use super::{internal_error, validation_error, ApiError};
use crate::middleware::{AuthUser, StaffUser};
use crate::models::ShowTheme;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/show_themes", get(list_themes).post(create_theme))
}

// GET /api/show_themes
async fn list_themes(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let themes = sqlx::query_as::<_, ShowTheme>("SELECT id, name FROM show_themes ORDER BY id")
        .fetch_all(&state.db.pool)
        .await
        .map_err(|e| internal_error("list_themes", e))?;

    Ok(Json(themes))
}

// POST /api/show_themes
#[derive(Debug, Deserialize, Validate)]
struct CreateThemeRequest {
    #[validate(length(min = 1, max = 255))]
    name: String,
}

async fn create_theme(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Json(req): Json<CreateThemeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(validation_error)?;

    let theme = sqlx::query_as::<_, ShowTheme>(
        "INSERT INTO show_themes (name) VALUES ($1) RETURNING id, name"
    )
    .bind(req.name.trim())
    .fetch_one(&state.db.pool)
    .await
    .map_err(|e| internal_error("create_theme", e))?;

    Ok((StatusCode::CREATED, Json(theme)))
}
