use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Seat;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PlanetariumDome {
    pub id: i64,
    pub name: String,
    pub rows: i32,
    pub seats_in_row: i32,
}

impl PlanetariumDome {
    pub fn layout(&self) -> DomeLayout {
        DomeLayout { rows: self.rows, seats_in_row: self.seats_in_row }
    }
}

/// Сетка мест купола: rows x seats_in_row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DomeLayout {
    pub rows: i32,
    pub seats_in_row: i32,
}

impl DomeLayout {
    pub const fn new(rows: i32, seats_in_row: i32) -> Self {
        Self { rows, seats_in_row }
    }

    pub fn capacity(&self) -> i64 {
        i64::from(self.rows.max(0)) * i64::from(self.seats_in_row.max(0))
    }

    pub fn contains(&self, seat: Seat) -> bool {
        (1..=self.rows).contains(&seat.row) && (1..=self.seats_in_row).contains(&seat.seat)
    }

    /// Все места сетки по порядку (ряд, место).
    pub fn seats(&self) -> impl Iterator<Item = Seat> + '_ {
        (1..=self.rows).flat_map(move |row| (1..=self.seats_in_row).map(move |seat| Seat::new(row, seat)))
    }
}
