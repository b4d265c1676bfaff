use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::PgPool;
use tracing::warn;

use super::{BookingStore, StoreError};
use crate::models::{DomeLayout, Reservation, Seat, Ticket};

const TICKET_SEAT_CONSTRAINT: &str = "tickets_session_seat_key";
const DEADLOCK_DETECTED: &str = "40P01";

/// Хранилище поверх Postgres. Защита от двойной продажи - ограничение
/// `tickets_session_seat_key`, проверяемое внутри транзакции вставки.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn taken_among<'e, E>(
        executor: E,
        session_id: i64,
        rows: &[i32],
        numbers: &[i32],
    ) -> Result<Vec<Seat>, StoreError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let taken = sqlx::query_as::<_, Seat>(
            r#"
            SELECT t."row", t.seat
            FROM tickets t
            JOIN UNNEST($2::int4[], $3::int4[]) AS req("row", seat)
              ON req."row" = t."row" AND req.seat = t.seat
            WHERE t.show_session_id = $1
            ORDER BY t."row", t.seat
            "#
        )
        .bind(session_id)
        .bind(rows)
        .bind(numbers)
        .fetch_all(executor)
        .await?;

        Ok(taken)
    }
}

/// Проигрыш гонки за место: нарушение уникальности билета или взаимная блокировка.
fn is_seat_conflict(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| {
            (db.is_unique_violation() && db.constraint() == Some(TICKET_SEAT_CONSTRAINT))
                || db.code().as_deref() == Some(DEADLOCK_DETECTED)
        })
        .unwrap_or(false)
}

/// Колонки (ряды, номера) в порядке (ряд, место). Все транзакции берут
/// блокировки индекса в одном порядке и не ловят взаимную блокировку.
fn seat_columns(seats: &[Seat]) -> (Vec<i32>, Vec<i32>) {
    let mut ordered = seats.to_vec();
    ordered.sort_unstable();
    ordered.iter().map(|s| (s.row, s.seat)).unzip()
}

/// Победитель гонки мог уже отменить бронь: тогда отдаём запрошенные места.
fn conflicting_seats(reread: Vec<Seat>, requested: &[Seat]) -> Vec<Seat> {
    if !reread.is_empty() {
        return reread;
    }
    let mut seats = requested.to_vec();
    seats.sort_unstable();
    seats
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn session_layout(&self, session_id: i64) -> Result<Option<DomeLayout>, StoreError> {
        let layout = sqlx::query_as::<_, DomeLayout>(
            r#"
            SELECT d."rows" AS "rows", d.seats_in_row
            FROM show_sessions s
            JOIN planetarium_domes d ON d.id = s.planetarium_dome_id
            WHERE s.id = $1
            "#
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(layout)
    }

    async fn occupied_seats(&self, session_id: i64) -> Result<Vec<Seat>, StoreError> {
        let seats = sqlx::query_as::<_, Seat>(
            r#"SELECT "row", seat FROM tickets WHERE show_session_id = $1 ORDER BY "row", seat"#
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(seats)
    }

    async fn insert_reservation(
        &self,
        user_id: i64,
        session_id: i64,
        layout: DomeLayout,
        seats: &[Seat],
    ) -> Result<Reservation, StoreError> {
        let (rows, numbers) = seat_columns(seats);

        let mut tx = self.pool.begin().await?;

        // 0) Держим строку сеанса до коммита: смена купола подождёт нас или мы увидим новый купол
        let dome_id = sqlx::query_scalar::<_, i64>(
            "SELECT planetarium_dome_id FROM show_sessions WHERE id = $1 FOR SHARE"
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(dome_id) = dome_id else {
            tx.rollback().await?;
            return Err(StoreError::SessionNotFound(session_id));
        };

        let current = sqlx::query_as::<_, DomeLayout>(
            r#"SELECT "rows", seats_in_row FROM planetarium_domes WHERE id = $1"#
        )
        .bind(dome_id)
        .fetch_one(&mut *tx)
        .await?;

        if current != layout {
            tx.rollback().await?;
            return Err(StoreError::LayoutChanged(session_id));
        }

        // 1) Быстрая проверка, чтобы вернуть список занятых мест
        let taken = Self::taken_among(&mut *tx, session_id, &rows, &numbers).await?;
        if !taken.is_empty() {
            tx.rollback().await?;
            return Err(StoreError::SeatsTaken(taken));
        }

        // 2) Сама бронь
        let (reservation_id, created_at): (i64, NaiveDateTime) = sqlx::query_as(
            "INSERT INTO reservations (user_id) VALUES ($1) RETURNING id, created_at"
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        // 3) Все билеты одним запросом. Гонку с параллельной бронью ловит ограничение уникальности
        let inserted = sqlx::query_as::<_, Ticket>(
            r#"
            INSERT INTO tickets (reservation_id, show_session_id, "row", seat)
            SELECT $1, $2, req."row", req.seat
            FROM UNNEST($3::int4[], $4::int4[]) WITH ORDINALITY AS req("row", seat, ord)
            ORDER BY req.ord
            RETURNING id, reservation_id, show_session_id, "row", seat
            "#
        )
        .bind(reservation_id)
        .bind(session_id)
        .bind(&rows)
        .bind(&numbers)
        .fetch_all(&mut *tx)
        .await;

        let mut tickets = match inserted {
            Ok(tickets) => tickets,
            Err(e) if is_seat_conflict(&e) => {
                tx.rollback().await?;
                let reread = Self::taken_among(&self.pool, session_id, &rows, &numbers).await?;
                let taken = conflicting_seats(reread, seats);
                warn!(
                    "reservation for session {} lost a race on {} seat(s): {}",
                    session_id,
                    taken.len(),
                    e
                );
                return Err(StoreError::SeatsTaken(taken));
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;

        tickets.sort_by_key(|t| t.id);
        Ok(Reservation { id: reservation_id, user_id, created_at, tickets })
    }

    async fn reservation_owner(&self, reservation_id: i64) -> Result<Option<i64>, StoreError> {
        let owner = sqlx::query_scalar::<_, i64>("SELECT user_id FROM reservations WHERE id = $1")
            .bind(reservation_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(owner)
    }

    async fn delete_reservation(&self, reservation_id: i64) -> Result<Option<Vec<Ticket>>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let tickets = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT id, reservation_id, show_session_id, "row", seat
            FROM tickets
            WHERE reservation_id = $1
            ORDER BY id
            FOR UPDATE
            "#
        )
        .bind(reservation_id)
        .fetch_all(&mut *tx)
        .await?;

        // билеты уходят каскадом
        let deleted = sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(reservation_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(tickets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_follow_row_then_seat_order() {
        let forward: Vec<Seat> = (1..=5).map(|n| Seat::new(1, n)).collect();
        let backward: Vec<Seat> = forward.iter().rev().copied().collect();

        assert_eq!(seat_columns(&forward), seat_columns(&backward));

        let (rows, numbers) = seat_columns(&[Seat::new(2, 1), Seat::new(1, 3), Seat::new(1, 2)]);
        assert_eq!(rows, vec![1, 1, 2]);
        assert_eq!(numbers, vec![2, 3, 1]);
    }

    #[test]
    fn empty_reread_falls_back_to_requested_seats() {
        let requested = [Seat::new(3, 1), Seat::new(1, 1)];

        assert_eq!(conflicting_seats(Vec::new(), &requested), vec![Seat::new(1, 1), Seat::new(3, 1)]);
        assert_eq!(conflicting_seats(vec![Seat::new(3, 1)], &requested), vec![Seat::new(3, 1)]);
    }

    #[test]
    fn non_database_errors_are_not_conflicts() {
        assert!(!is_seat_conflict(&sqlx::Error::PoolTimedOut));
    }
}
