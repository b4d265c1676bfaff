//! ledger.rs
//!
//! Реестр бронирований: единственное место, где создаются и отменяются брони.
//!
//! Инварианты:
//! - место билета лежит внутри сетки купола сеанса (1..=rows, 1..=seats_in_row);
//! - пара (сеанс, ряд, место) встречается не более чем в одном билете;
//! - бронь сохраняется целиком или не сохраняется вовсе.
//!
//! Сам реестр не хранит состояния: правда о занятости живёт в `BookingStore`.

use axum::http::StatusCode;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{Reservation, Seat, Ticket};
use crate::services::store::{BookingStore, StoreError};

const LAYOUT_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no seats requested")]
    EmptyBatch,
    #[error("{seat} requested more than once")]
    DuplicateInBatch { seat: Seat },
    #[error("{seat} is outside the dome ({rows} rows x {seats_in_row} seats)")]
    InvalidSeat { seat: Seat, rows: i32, seats_in_row: i32 },
    #[error("seats already taken: {}", format_seats(.seats))]
    SeatAlreadyTaken { seats: Vec<Seat> },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("reservation {0} belongs to another user")]
    Forbidden(i64),
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
}

fn format_seats(seats: &[Seat]) -> String {
    seats.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl LedgerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::EmptyBatch
            | LedgerError::DuplicateInBatch { .. }
            | LedgerError::InvalidSeat { .. } => StatusCode::BAD_REQUEST,
            LedgerError::SeatAlreadyTaken { .. } => StatusCode::CONFLICT,
            LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
            LedgerError::Forbidden(_) => StatusCode::FORBIDDEN,
            LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn session_not_found(id: i64) -> Self {
        LedgerError::NotFound { entity: "show session", id }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SeatsTaken(seats) => LedgerError::SeatAlreadyTaken { seats },
            StoreError::SessionNotFound(id) => LedgerError::session_not_found(id),
            other => LedgerError::Storage(other),
        }
    }
}

/// Результат отмены брони: какие места освободились.
#[derive(Debug, Clone)]
pub struct CancelledReservation {
    pub reservation_id: i64,
    pub freed: Vec<Ticket>,
}

impl CancelledReservation {
    /// Сеансы, в которых освободились места, без повторов.
    pub fn session_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.freed.iter().map(|t| t.show_session_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[derive(Clone)]
pub struct BookingLedger {
    store: Arc<dyn BookingStore>,
}

impl BookingLedger {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Проверяет пачку мест и создаёт бронь одной транзакцией.
    pub async fn create_reservation(
        &self,
        user_id: i64,
        session_id: i64,
        seats: &[Seat],
    ) -> Result<Reservation, LedgerError> {
        if seats.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }

        let mut seen = HashSet::with_capacity(seats.len());
        if let Some(seat) = seats.iter().find(|seat| !seen.insert(**seat)) {
            return Err(LedgerError::DuplicateInBatch { seat: *seat });
        }

        // Купол сеанса может смениться между проверкой и вставкой: тогда проверяем заново
        for _ in 0..LAYOUT_ATTEMPTS {
            let layout = self
                .store
                .session_layout(session_id)
                .await?
                .ok_or_else(|| LedgerError::session_not_found(session_id))?;

            if let Some(seat) = seats.iter().find(|seat| !layout.contains(**seat)) {
                return Err(LedgerError::InvalidSeat {
                    seat: *seat,
                    rows: layout.rows,
                    seats_in_row: layout.seats_in_row,
                });
            }

            match self.store.insert_reservation(user_id, session_id, layout, seats).await {
                Ok(reservation) => {
                    info!(
                        "reservation {} created for user {} on session {} ({} tickets)",
                        reservation.id,
                        user_id,
                        session_id,
                        reservation.tickets.len()
                    );
                    return Ok(reservation);
                }
                Err(StoreError::LayoutChanged(_)) => {
                    debug!("dome of session {} changed during booking, revalidating", session_id);
                }
                Err(StoreError::SeatsTaken(taken)) => {
                    warn!(
                        "user {} tried to book taken seats on session {}: {}",
                        user_id,
                        session_id,
                        format_seats(&taken)
                    );
                    return Err(LedgerError::SeatAlreadyTaken { seats: taken });
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Storage(StoreError::LayoutChanged(session_id)))
    }

    /// Свободные места сеанса по порядку (ряд, место).
    pub async fn list_available_seats(&self, session_id: i64) -> Result<Vec<Seat>, LedgerError> {
        let layout = self
            .store
            .session_layout(session_id)
            .await?
            .ok_or_else(|| LedgerError::session_not_found(session_id))?;

        let occupied: HashSet<Seat> = self.store.occupied_seats(session_id).await?.into_iter().collect();

        Ok(layout.seats().filter(|seat| !occupied.contains(seat)).collect())
    }

    pub async fn taken_seats(&self, session_id: i64) -> Result<Vec<Seat>, LedgerError> {
        if self.store.session_layout(session_id).await?.is_none() {
            return Err(LedgerError::session_not_found(session_id));
        }
        Ok(self.store.occupied_seats(session_id).await?)
    }

    /// Отменяет бронь. Отменить может только владелец.
    pub async fn cancel_reservation(
        &self,
        reservation_id: i64,
        user_id: i64,
    ) -> Result<CancelledReservation, LedgerError> {
        let not_found = || LedgerError::NotFound { entity: "reservation", id: reservation_id };

        let owner = self
            .store
            .reservation_owner(reservation_id)
            .await?
            .ok_or_else(not_found)?;
        if owner != user_id {
            return Err(LedgerError::Forbidden(reservation_id));
        }

        let freed = self
            .store
            .delete_reservation(reservation_id)
            .await?
            .ok_or_else(not_found)?;

        info!("reservation {} cancelled, {} seats released", reservation_id, freed.len());
        Ok(CancelledReservation { reservation_id, freed })
    }
}
