use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::{internal_error, validation_error, ApiError};
use crate::middleware::{AuthUser, StaffUser};
use crate::models::PlanetariumDome;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/planetarium_domes", get(list_domes).post(create_dome))
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DomeResponse {
    pub id: i64,
    pub name: String,
    pub rows: i32,
    pub seats_in_row: i32,
    pub capacity: i64,
}

impl From<PlanetariumDome> for DomeResponse {
    fn from(dome: PlanetariumDome) -> Self {
        let capacity = dome.layout().capacity();
        Self {
            id: dome.id,
            name: dome.name,
            rows: dome.rows,
            seats_in_row: dome.seats_in_row,
            capacity,
        }
    }
}

// GET /api/planetarium_domes
async fn list_domes(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let domes = sqlx::query_as::<_, PlanetariumDome>(
        r#"SELECT id, name, "rows", seats_in_row FROM planetarium_domes ORDER BY id"#
    )
    .fetch_all(&state.db.pool)
    .await
    .map_err(|e| internal_error("list_domes", e))?;

    let payload: Vec<DomeResponse> = domes.into_iter().map(DomeResponse::from).collect();
    Ok(Json(payload))
}

// POST /api/planetarium_domes
#[derive(Debug, Deserialize, Validate)]
struct CreateDomeRequest {
    #[validate(length(min = 1, max = 255))]
    name: String,
    #[validate(range(min = 1, max = 1000))]
    rows: i32,
    #[validate(range(min = 1, max = 1000))]
    seats_in_row: i32,
}

async fn create_dome(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Json(req): Json<CreateDomeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(validation_error)?;

    let dome = sqlx::query_as::<_, PlanetariumDome>(
        r#"
        INSERT INTO planetarium_domes (name, "rows", seats_in_row)
        VALUES ($1, $2, $3)
        RETURNING id, name, "rows", seats_in_row
        "#
    )
    .bind(req.name.trim())
    .bind(req.rows)
    .bind(req.seats_in_row)
    .fetch_one(&state.db.pool)
    .await
    .map_err(|e| internal_error("create_dome", e))?;

    tracing::info!("Dome {} created with capacity {}", dome.id, dome.layout().capacity());
    Ok((StatusCode::CREATED, Json(DomeResponse::from(dome))))
}
