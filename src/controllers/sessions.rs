use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::Arc;
use validator::Validate;

use super::domes::DomeResponse;
use super::shows::{load_show_detail, ShowDetail};
use super::{internal_error, is_foreign_key_violation, ledger_error, validation_error, ApiError};
use crate::middleware::{AuthUser, StaffUser};
use crate::models::{PlanetariumDome, Seat, ShowSession};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/show_sessions", get(list_sessions).post(create_session))
        .route(
            "/show_sessions/{id}",
            get(get_session)
                .put(replace_session)
                .patch(patch_session)
                .delete(delete_session),
        )
        .route("/show_sessions/{id}/available_seats", get(available_seats))
}

/* ---------- helpers ---------- */

#[derive(Debug, Serialize)]
struct SessionResponse {
    id: i64,
    astronomy_show: i64,
    planetarium_dome: i64,
    show_time: NaiveDateTime,
}

impl From<ShowSession> for SessionResponse {
    fn from(s: ShowSession) -> Self {
        Self {
            id: s.id,
            astronomy_show: s.astronomy_show_id,
            planetarium_dome: s.planetarium_dome_id,
            show_time: s.show_time,
        }
    }
}

fn session_not_found(id: i64) -> ApiError {
    (StatusCode::NOT_FOUND, format!("Show session {} not found", id))
}

fn unknown_references() -> ApiError {
    (StatusCode::BAD_REQUEST, "Unknown astronomy show or planetarium dome".to_string())
}

/* ---------- LIST ---------- */

#[derive(Debug, Default, Deserialize)]
struct SessionsQuery {
    date: Option<String>,
    astronomy_show: Option<String>,
}

#[derive(Debug, PartialEq)]
struct SessionFilters {
    date: Option<NaiveDate>,
    astronomy_show: Option<i64>,
}

// ?date=2024-05-01&astronomy_show=3, пустые значения = без фильтра
fn parse_filters(query: &SessionsQuery) -> Result<SessionFilters, ApiError> {
    let date = match query.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            (StatusCode::BAD_REQUEST, format!("Invalid date \"{}\", expected YYYY-MM-DD", raw))
        })?),
        None => None,
    };

    let astronomy_show = match query.astronomy_show.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
            (StatusCode::BAD_REQUEST, format!("Invalid astronomy show id \"{}\"", raw))
        })?),
        None => None,
    };

    Ok(SessionFilters { date, astronomy_show })
}

#[derive(Debug, FromRow)]
struct SessionListRow {
    id: i64,
    show_time: NaiveDateTime,
    astronomy_show_title: String,
    astronomy_show_image: Option<String>,
    planetarium_dome_name: String,
    planetarium_dome_capacity: i64,
    tickets_available: i64,
}

#[derive(Debug, Serialize)]
struct SessionListItem {
    id: i64,
    show_time: NaiveDateTime,
    astronomy_show_title: String,
    astronomy_show_image: Option<String>,
    planetarium_dome_name: String,
    planetarium_dome_capacity: i64,
    tickets_available: i64,
}

// GET /api/show_sessions?date=&astronomy_show=
async fn list_sessions(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<SessionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filters = parse_filters(&params)?;

    let rows = sqlx::query_as::<_, SessionListRow>(
        r#"
        SELECT s.id, s.show_time,
               a.title AS astronomy_show_title,
               a.image AS astronomy_show_image,
               d.name AS planetarium_dome_name,
               d."rows"::int8 * d.seats_in_row AS planetarium_dome_capacity,
               d."rows"::int8 * d.seats_in_row - COUNT(t.id) AS tickets_available
        FROM show_sessions s
        JOIN astronomy_shows a ON a.id = s.astronomy_show_id
        JOIN planetarium_domes d ON d.id = s.planetarium_dome_id
        LEFT JOIN tickets t ON t.show_session_id = s.id
        WHERE ($1::date IS NULL OR s.show_time::date = $1)
          AND ($2::int8 IS NULL OR s.astronomy_show_id = $2)
        GROUP BY s.id, a.id, d.id
        ORDER BY s.show_time, s.id
        "#
    )
    .bind(filters.date)
    .bind(filters.astronomy_show)
    .fetch_all(&state.db.pool)
    .await
    .map_err(|e| internal_error("list_sessions", e))?;

    let payload: Vec<SessionListItem> = rows
        .into_iter()
        .map(|r| SessionListItem {
            id: r.id,
            show_time: r.show_time,
            astronomy_show_title: r.astronomy_show_title,
            astronomy_show_image: r.astronomy_show_image.as_deref().map(|path| state.media.url_for(path)),
            planetarium_dome_name: r.planetarium_dome_name,
            planetarium_dome_capacity: r.planetarium_dome_capacity,
            tickets_available: r.tickets_available,
        })
        .collect();

    Ok(Json(payload))
}

/* ---------- DETAIL ---------- */

#[derive(Debug, Serialize)]
struct SessionDetail {
    id: i64,
    show_time: NaiveDateTime,
    astronomy_show: ShowDetail,
    planetarium_dome: DomeResponse,
    taken_places: Vec<Seat>,
}

// GET /api/show_sessions/{id}
async fn get_session(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let session = sqlx::query_as::<_, ShowSession>(
        "SELECT id, astronomy_show_id, planetarium_dome_id, show_time FROM show_sessions WHERE id = $1"
    )
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await
    .map_err(|e| internal_error("get_session", e))?
    .ok_or_else(|| session_not_found(id))?;

    let dome = sqlx::query_as::<_, PlanetariumDome>(
        r#"SELECT id, name, "rows", seats_in_row FROM planetarium_domes WHERE id = $1"#
    )
    .bind(session.planetarium_dome_id)
    .fetch_one(&state.db.pool)
    .await
    .map_err(|e| internal_error("get_session dome", e))?;

    let show = load_show_detail(&state.db.pool, &state.media, session.astronomy_show_id)
        .await
        .map_err(|e| internal_error("get_session show", e))?
        .ok_or_else(|| internal_error("get_session show", "show vanished"))?;

    let taken_places = state.ledger.taken_seats(id).await.map_err(ledger_error)?;

    Ok(Json(SessionDetail {
        id: session.id,
        show_time: session.show_time,
        astronomy_show: show,
        planetarium_dome: DomeResponse::from(dome),
        taken_places,
    }))
}

/* ---------- AVAILABLE SEATS ---------- */

#[derive(Debug, Serialize)]
struct AvailableSeatsResponse {
    show_session: i64,
    count: usize,
    seats: Vec<Seat>,
}

// GET /api/show_sessions/{id}/available_seats
async fn available_seats(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    // 1. Пробуем кеш
    let seats = match state.cache.get_available_seats(id).await {
        Some(seats) => seats,
        None => {
            // 2. Cache miss: версию берём до чтения реестра, иначе можно закешировать устаревший список
            let version = state.cache.seats_version(id).await;
            let seats = state.ledger.list_available_seats(id).await.map_err(ledger_error)?;
            if let Some(version) = version {
                state.cache.cache_available_seats(id, &version, &seats).await;
            }
            seats
        }
    };

    Ok(Json(AvailableSeatsResponse { show_session: id, count: seats.len(), seats }))
}

/* ---------- CREATE ---------- */

#[derive(Debug, Deserialize, Validate)]
struct SessionRequest {
    #[validate(range(min = 1))]
    astronomy_show: i64,
    #[validate(range(min = 1))]
    planetarium_dome: i64,
    show_time: NaiveDateTime,
}

// POST /api/show_sessions
async fn create_session(
    State(state): State<Arc<AppState>>,
    StaffUser(staff): StaffUser,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(validation_error)?;

    let inserted = sqlx::query_as::<_, ShowSession>(
        r#"
        INSERT INTO show_sessions (astronomy_show_id, planetarium_dome_id, show_time)
        VALUES ($1, $2, $3)
        RETURNING id, astronomy_show_id, planetarium_dome_id, show_time
        "#
    )
    .bind(req.astronomy_show)
    .bind(req.planetarium_dome)
    .bind(req.show_time)
    .fetch_one(&state.db.pool)
    .await;

    let session = match inserted {
        Ok(session) => session,
        Err(e) if is_foreign_key_violation(&e) => return Err(unknown_references()),
        Err(e) => return Err(internal_error("create_session", e)),
    };

    tracing::info!("Show session {} created by {}", session.id, staff.email);
    Ok((StatusCode::CREATED, Json(SessionResponse::from(session))))
}

/* ---------- UPDATE ---------- */

#[derive(Debug, Default, Deserialize, Validate)]
struct SessionPatch {
    #[validate(range(min = 1))]
    astronomy_show: Option<i64>,
    #[validate(range(min = 1))]
    planetarium_dome: Option<i64>,
    show_time: Option<NaiveDateTime>,
}

impl From<SessionRequest> for SessionPatch {
    fn from(req: SessionRequest) -> Self {
        Self {
            astronomy_show: Some(req.astronomy_show),
            planetarium_dome: Some(req.planetarium_dome),
            show_time: Some(req.show_time),
        }
    }
}

// PUT /api/show_sessions/{id}
async fn replace_session(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(validation_error)?;
    let session = update_session(&state, id, SessionPatch::from(req)).await?;
    Ok(Json(session))
}

// PATCH /api/show_sessions/{id}
async fn patch_session(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
    Json(patch): Json<SessionPatch>,
) -> Result<impl IntoResponse, ApiError> {
    patch.validate().map_err(validation_error)?;
    let session = update_session(&state, id, patch).await?;
    Ok(Json(session))
}

async fn update_session(state: &AppState, id: i64, patch: SessionPatch) -> Result<SessionResponse, ApiError> {
    let mut tx = state.db.pool.begin().await
        .map_err(|e| internal_error("update_session begin", e))?;

    // Блокировка строки сеанса: параллельная бронь дождётся нас и перепроверит купол
    let current = sqlx::query_as::<_, ShowSession>(
        r#"
        SELECT id, astronomy_show_id, planetarium_dome_id, show_time
        FROM show_sessions
        WHERE id = $1
        FOR UPDATE
        "#
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| internal_error("update_session lookup", e))?
    .ok_or_else(|| session_not_found(id))?;

    let dome_id = patch.planetarium_dome.unwrap_or(current.planetarium_dome_id);
    if dome_id != current.planetarium_dome_id {
        let sold = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM tickets WHERE show_session_id = $1)"
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| internal_error("update_session tickets", e))?;

        if sold {
            return Err((
                StatusCode::CONFLICT,
                format!("Show session {} already has tickets, the dome cannot be changed", id),
            ));
        }
    }

    let updated = sqlx::query_as::<_, ShowSession>(
        r#"
        UPDATE show_sessions
        SET astronomy_show_id = $2, planetarium_dome_id = $3, show_time = $4
        WHERE id = $1
        RETURNING id, astronomy_show_id, planetarium_dome_id, show_time
        "#
    )
    .bind(id)
    .bind(patch.astronomy_show.unwrap_or(current.astronomy_show_id))
    .bind(dome_id)
    .bind(patch.show_time.unwrap_or(current.show_time))
    .fetch_one(&mut *tx)
    .await;

    let session = match updated {
        Ok(session) => session,
        Err(e) if is_foreign_key_violation(&e) => return Err(unknown_references()),
        Err(e) => return Err(internal_error("update_session", e)),
    };

    tx.commit().await.map_err(|e| internal_error("update_session commit", e))?;

    if dome_id != current.planetarium_dome_id {
        state.cache.invalidate_seats(id).await;
    }

    Ok(SessionResponse::from(session))
}

/* ---------- DELETE ---------- */

// DELETE /api/show_sessions/{id}
async fn delete_session(
    State(state): State<Arc<AppState>>,
    StaffUser(staff): StaffUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = sqlx::query("DELETE FROM show_sessions WHERE id = $1")
        .bind(id)
        .execute(&state.db.pool)
        .await;

    let affected = match deleted {
        Ok(result) => result.rows_affected(),
        Err(e) if is_foreign_key_violation(&e) => {
            return Err((
                StatusCode::CONFLICT,
                format!("Show session {} has tickets and cannot be deleted", id),
            ));
        }
        Err(e) => return Err(internal_error("delete_session", e)),
    };

    if affected == 0 {
        return Err(session_not_found(id));
    }

    state.cache.invalidate_seats(id).await;
    tracing::info!("Show session {} deleted by {}", id, staff.email);

    Ok(StatusCode::NO_CONTENT)
}
