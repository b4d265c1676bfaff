pub mod themes;
pub mod domes;
pub mod shows;
pub mod sessions;
pub mod reservations;

use axum::{http::StatusCode, Router};
use std::sync::Arc;
use validator::ValidationErrors;

use crate::services::LedgerError;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(themes::routes())
        .merge(domes::routes())
        .merge(shows::routes())
        .merge(sessions::routes())
        .merge(reservations::routes())
}

/* ---------- helpers ---------- */

pub(crate) type ApiError = (StatusCode, String);

pub(crate) fn internal_error(context: &str, e: impl std::fmt::Debug) -> ApiError {
    tracing::error!("{} failed: {:?}", context, e);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
}

pub(crate) fn validation_error(e: ValidationErrors) -> ApiError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

pub(crate) fn ledger_error(e: LedgerError) -> ApiError {
    let status = e.status_code();
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        return internal_error("booking ledger", e);
    }
    (status, e.to_string())
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error().map(|db| db.is_unique_violation()).unwrap_or(false)
}

pub(crate) fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    e.as_database_error().map(|db| db.is_foreign_key_violation()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Seat;
    use crate::services::store::StoreError;

    #[test]
    fn ledger_errors_keep_their_status_and_message() {
        let (status, body) = ledger_error(LedgerError::SeatAlreadyTaken { seats: vec![Seat::new(1, 2)] });
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, "seats already taken: row 1 seat 2");

        let (status, _) = ledger_error(LedgerError::EmptyBatch);
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn storage_errors_are_not_leaked() {
        let (status, body) = ledger_error(LedgerError::Storage(StoreError::Database(sqlx::Error::PoolTimedOut)));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Internal server error");
    }
}
