use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

use super::{internal_error, ledger_error, validation_error, ApiError};
use crate::middleware::AuthUser;
use crate::models::{Reservation, Seat};
use crate::pagination::{Page, PageQuery, PageRequest};
use crate::AppState;

const RESERVATIONS_PATH: &str = "/api/reservations";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reservations", get(list_reservations).post(create_reservation))
        .route("/reservations/{id}", delete(cancel_reservation))
}

/* ---------- LIST ---------- */

#[derive(Debug, FromRow)]
struct ReservationRow {
    id: i64,
    created_at: NaiveDateTime,
}

#[derive(Debug, FromRow)]
struct TicketRow {
    id: i64,
    reservation_id: i64,
    row: i32,
    seat: i32,
    show_session_id: i64,
    show_time: NaiveDateTime,
    astronomy_show_title: String,
    planetarium_dome_name: String,
}

#[derive(Debug, Serialize)]
struct TicketSession {
    id: i64,
    show_time: NaiveDateTime,
    astronomy_show_title: String,
    planetarium_dome_name: String,
}

#[derive(Debug, Serialize)]
struct TicketResponse {
    id: i64,
    row: i32,
    seat: i32,
    show_session: TicketSession,
}

#[derive(Debug, Serialize)]
struct ReservationResponse {
    id: i64,
    created_at: NaiveDateTime,
    tickets: Vec<TicketResponse>,
}

// GET /api/reservations?page=&page_size=
async fn list_reservations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let request = PageRequest::resolve(
        &query,
        state.config.pagination.reservation_page_size,
        state.config.pagination.max_page_size,
    );

    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reservations WHERE user_id = $1")
        .bind(user.user_id)
        .fetch_one(&state.db.pool)
        .await
        .map_err(|e| internal_error("list_reservations count", e))?;

    let reservations = sqlx::query_as::<_, ReservationRow>(
        r#"
        SELECT id, created_at
        FROM reservations
        WHERE user_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#
    )
    .bind(user.user_id)
    .bind(request.limit())
    .bind(request.offset())
    .fetch_all(&state.db.pool)
    .await
    .map_err(|e| internal_error("list_reservations", e))?;

    let ids: Vec<i64> = reservations.iter().map(|r| r.id).collect();

    // Билеты всей страницы одним запросом
    let tickets = if ids.is_empty() {
        Vec::new()
    } else {
        sqlx::query_as::<_, TicketRow>(
            r#"
            SELECT t.id, t.reservation_id, t."row", t.seat,
                   s.id AS show_session_id, s.show_time,
                   a.title AS astronomy_show_title,
                   d.name AS planetarium_dome_name
            FROM tickets t
            JOIN show_sessions s ON s.id = t.show_session_id
            JOIN astronomy_shows a ON a.id = s.astronomy_show_id
            JOIN planetarium_domes d ON d.id = s.planetarium_dome_id
            WHERE t.reservation_id = ANY($1)
            ORDER BY t.id
            "#
        )
        .bind(&ids)
        .fetch_all(&state.db.pool)
        .await
        .map_err(|e| internal_error("list_reservations tickets", e))?
    };

    let mut by_reservation: HashMap<i64, Vec<TicketResponse>> = HashMap::new();
    for t in tickets {
        by_reservation.entry(t.reservation_id).or_default().push(TicketResponse {
            id: t.id,
            row: t.row,
            seat: t.seat,
            show_session: TicketSession {
                id: t.show_session_id,
                show_time: t.show_time,
                astronomy_show_title: t.astronomy_show_title,
                planetarium_dome_name: t.planetarium_dome_name,
            },
        });
    }

    let results: Vec<ReservationResponse> = reservations
        .into_iter()
        .map(|r| ReservationResponse {
            id: r.id,
            created_at: r.created_at,
            tickets: by_reservation.remove(&r.id).unwrap_or_default(),
        })
        .collect();

    Ok(Json(Page::new(results, count, request, RESERVATIONS_PATH)))
}

/* ---------- CREATE ---------- */

#[derive(Debug, Deserialize, Validate)]
struct CreateReservationRequest {
    #[validate(range(min = 1))]
    show_session: i64,
    #[serde(default)]
    #[validate(length(max = 500))]
    tickets: Vec<Seat>,
}

#[derive(Debug, Serialize)]
struct CreatedTicket {
    id: i64,
    row: i32,
    seat: i32,
}

#[derive(Debug, Serialize)]
struct CreatedReservation {
    id: i64,
    created_at: NaiveDateTime,
    show_session: i64,
    tickets: Vec<CreatedTicket>,
}

impl CreatedReservation {
    fn new(reservation: Reservation, show_session: i64) -> Self {
        Self {
            id: reservation.id,
            created_at: reservation.created_at,
            show_session,
            tickets: reservation
                .tickets
                .into_iter()
                .map(|t| CreatedTicket { id: t.id, row: t.row, seat: t.seat })
                .collect(),
        }
    }
}

// POST /api/reservations
async fn create_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateReservationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(validation_error)?;

    let reservation = state
        .ledger
        .create_reservation(user.user_id, req.show_session, &req.tickets)
        .await
        .map_err(ledger_error)?;

    state.cache.invalidate_seats(req.show_session).await;

    Ok((StatusCode::CREATED, Json(CreatedReservation::new(reservation, req.show_session))))
}

/* ---------- CANCEL ---------- */

// DELETE /api/reservations/{id}
async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let cancelled = state
        .ledger
        .cancel_reservation(id, user.user_id)
        .await
        .map_err(ledger_error)?;

    let sessions = cancelled.session_ids();
    futures::future::join_all(sessions.iter().map(|&session_id| state.cache.invalidate_seats(session_id))).await;

    Ok(StatusCode::NO_CONTENT)
}
