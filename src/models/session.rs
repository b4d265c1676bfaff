use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ShowSession {
    pub id: i64,
    pub astronomy_show_id: i64,
    pub planetarium_dome_id: i64,
    pub show_time: NaiveDateTime,
}
