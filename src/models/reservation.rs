use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Seat;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    pub id: i64,
    pub reservation_id: i64,
    pub show_session_id: i64,
    pub row: i32,
    pub seat: i32,
}

impl Ticket {
    pub fn seat(&self) -> Seat {
        Seat::new(self.row, self.seat)
    }
}

/// Бронь - контейнер билетов, созданных одним действием пользователя.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    pub user_id: i64,
    pub created_at: NaiveDateTime,
    pub tickets: Vec<Ticket>,
}
