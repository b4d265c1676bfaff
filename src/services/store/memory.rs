use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::{BookingStore, StoreError};
use crate::models::{DomeLayout, Reservation, Seat, Ticket};

/// Хранилище в памяти с той же семантикой, что и Postgres: вся бронь
/// проверяется и вставляется под одной блокировкой.
#[derive(Debug, Default)]
pub struct MemoryBookingStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<i64, DomeLayout>,
    reservations: BTreeMap<i64, Reservation>,
    // (сеанс, место) -> id брони
    occupancy: HashMap<(i64, Seat), i64>,
    next_reservation_id: i64,
    next_ticket_id: i64,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_session(&self, session_id: i64, layout: DomeLayout) {
        self.inner.lock().await.sessions.insert(session_id, layout);
    }

    pub async fn reservation(&self, reservation_id: i64) -> Option<Reservation> {
        self.inner.lock().await.reservations.get(&reservation_id).cloned()
    }

    pub async fn ticket_count(&self) -> usize {
        self.inner.lock().await.occupancy.len()
    }
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn session_layout(&self, session_id: i64) -> Result<Option<DomeLayout>, StoreError> {
        Ok(self.inner.lock().await.sessions.get(&session_id).copied())
    }

    async fn occupied_seats(&self, session_id: i64) -> Result<Vec<Seat>, StoreError> {
        let inner = self.inner.lock().await;
        let mut seats: Vec<Seat> = inner
            .occupancy
            .keys()
            .filter(|(sid, _)| *sid == session_id)
            .map(|(_, seat)| *seat)
            .collect();
        seats.sort();
        Ok(seats)
    }

    async fn insert_reservation(
        &self,
        user_id: i64,
        session_id: i64,
        layout: DomeLayout,
        seats: &[Seat],
    ) -> Result<Reservation, StoreError> {
        let mut inner = self.inner.lock().await;

        match inner.sessions.get(&session_id) {
            None => return Err(StoreError::SessionNotFound(session_id)),
            Some(current) if *current != layout => return Err(StoreError::LayoutChanged(session_id)),
            Some(_) => {}
        }

        let taken: Vec<Seat> = seats
            .iter()
            .copied()
            .filter(|seat| inner.occupancy.contains_key(&(session_id, *seat)))
            .collect();
        if !taken.is_empty() {
            return Err(StoreError::SeatsTaken(taken));
        }

        inner.next_reservation_id += 1;
        let reservation_id = inner.next_reservation_id;

        let mut tickets = Vec::with_capacity(seats.len());
        for seat in seats {
            inner.next_ticket_id += 1;
            tickets.push(Ticket {
                id: inner.next_ticket_id,
                reservation_id,
                show_session_id: session_id,
                row: seat.row,
                seat: seat.seat,
            });
            inner.occupancy.insert((session_id, *seat), reservation_id);
        }

        let reservation = Reservation {
            id: reservation_id,
            user_id,
            created_at: chrono::Utc::now().naive_utc(),
            tickets,
        };
        inner.reservations.insert(reservation_id, reservation.clone());

        Ok(reservation)
    }

    async fn reservation_owner(&self, reservation_id: i64) -> Result<Option<i64>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .reservations
            .get(&reservation_id)
            .map(|r| r.user_id))
    }

    async fn delete_reservation(&self, reservation_id: i64) -> Result<Option<Vec<Ticket>>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(reservation) = inner.reservations.remove(&reservation_id) else {
            return Ok(None);
        };

        for ticket in &reservation.tickets {
            inner.occupancy.remove(&(ticket.show_session_id, ticket.seat()));
        }

        Ok(Some(reservation.tickets))
    }
}
