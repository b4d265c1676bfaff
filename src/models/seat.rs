use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Координата места в зале: ряд и номер места в ряду, обе с единицы.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromRow, Serialize, Deserialize)]
pub struct Seat {
    pub row: i32,
    #[serde(alias = "seat_in_row")]
    pub seat: i32,
}

impl Seat {
    pub const fn new(row: i32, seat: i32) -> Self {
        Self { row, seat }
    }
}

impl std::fmt::Display for Seat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {} seat {}", self.row, self.seat)
    }
}
