//! Хранилище билетов, на которое опирается реестр бронирований.
//!
//! Реализации обязаны давать две гарантии:
//! 1. `insert_reservation` сохраняет бронь и все её билеты одной единицей
//!    либо не сохраняет ничего.
//! 2. Пара (сеанс, место) занимается не более одного раза даже при
//!    конкурентных вставках.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{DomeLayout, Reservation, Seat, Ticket};

pub use memory::MemoryBookingStore;
pub use postgres::PgBookingStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Места уже проданы на этот сеанс. Список может быть неполным, если конфликт
    /// обнаружен только ограничением уникальности.
    #[error("seats already taken: {0:?}")]
    SeatsTaken(Vec<Seat>),
    #[error("show session {0} does not exist")]
    SessionNotFound(i64),
    /// Купол сеанса сменился после проверки мест.
    #[error("dome layout of show session {0} changed")]
    LayoutChanged(i64),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Сетка купола, в котором идёт сеанс. `None` - сеанса нет.
    async fn session_layout(&self, session_id: i64) -> Result<Option<DomeLayout>, StoreError>;

    /// Занятые места сеанса.
    async fn occupied_seats(&self, session_id: i64) -> Result<Vec<Seat>, StoreError>;

    /// Атомарно создаёт бронь с билетами на переданные места. `layout` - сетка,
    /// по которой места проверены; если у сеанса уже другая, вставки не будет.
    async fn insert_reservation(
        &self,
        user_id: i64,
        session_id: i64,
        layout: DomeLayout,
        seats: &[Seat],
    ) -> Result<Reservation, StoreError>;

    async fn reservation_owner(&self, reservation_id: i64) -> Result<Option<i64>, StoreError>;

    /// Удаляет бронь вместе с билетами и возвращает удалённые билеты.
    /// `None` - брони уже нет.
    async fn delete_reservation(&self, reservation_id: i64) -> Result<Option<Vec<Ticket>>, StoreError>;
}
