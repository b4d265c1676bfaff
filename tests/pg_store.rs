//! Тесты Postgres-хранилища. Нужна живая база:
//! `DATABASE_URL=postgres://... cargo test --test pg_store -- --ignored`

use fake::{faker::internet::en::SafeEmail, faker::lorem::en::Sentence, Fake};
use futures::future::join_all;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use planetarium::database::Database;
use planetarium::models::{DomeLayout, Seat};
use planetarium::services::store::{BookingStore, PgBookingStore, StoreError};

async fn database() -> Database {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for pg_store tests");
    let db = Database::new(&url, 10).await.unwrap();
    db.run_migrations().await.unwrap();
    db
}

async fn create_user(pool: &PgPool) -> i64 {
    let email: String = SafeEmail().fake();
    sqlx::query_scalar(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name)
        VALUES ($1, 'not-a-real-hash', 'Test', 'User')
        RETURNING user_id
        "#
    )
    .bind(format!("{}-{}", Uuid::new_v4(), email))
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn create_dome(pool: &PgPool, rows: i32, seats_in_row: i32) -> i64 {
    sqlx::query_scalar(r#"INSERT INTO planetarium_domes (name, "rows", seats_in_row) VALUES ($1, $2, $3) RETURNING id"#)
        .bind(format!("Dome {}", Uuid::new_v4()))
        .bind(rows)
        .bind(seats_in_row)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Шоу, купол и сеанс; возвращает (id сеанса, id купола).
async fn create_session(pool: &PgPool, rows: i32, seats_in_row: i32) -> (i64, i64) {
    let description: String = Sentence(3..8).fake();
    let show_id: i64 = sqlx::query_scalar(
        "INSERT INTO astronomy_shows (title, description) VALUES ($1, $2) RETURNING id"
    )
    .bind(format!("Show {}", Uuid::new_v4()))
    .bind(description)
    .fetch_one(pool)
    .await
    .unwrap();

    let dome_id = create_dome(pool, rows, seats_in_row).await;

    let session_id = sqlx::query_scalar(
        "INSERT INTO show_sessions (astronomy_show_id, planetarium_dome_id, show_time) VALUES ($1, $2, NOW()) RETURNING id"
    )
    .bind(show_id)
    .bind(dome_id)
    .fetch_one(pool)
    .await
    .unwrap();

    (session_id, dome_id)
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn conflicting_batch_is_rolled_back() {
    let db = database().await;
    let store = PgBookingStore::new(db.pool.clone());
    let user = create_user(&db.pool).await;
    let (session, _) = create_session(&db.pool, 3, 3).await;
    let layout = DomeLayout::new(3, 3);

    store.insert_reservation(user, session, layout, &[Seat::new(1, 1)]).await.unwrap();
    let err = store
        .insert_reservation(user, session, layout, &[Seat::new(2, 2), Seat::new(1, 1)])
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::SeatsTaken(ref seats) if seats == &vec![Seat::new(1, 1)]));
    assert_eq!(store.occupied_seats(session).await.unwrap(), vec![Seat::new(1, 1)]);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn concurrent_inserts_on_one_seat_have_one_winner() {
    let db = database().await;
    let store = Arc::new(PgBookingStore::new(db.pool.clone()));
    let user = create_user(&db.pool).await;
    let (session, _) = create_session(&db.pool, 5, 5).await;

    let attempts = (1..=5).map(|n| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .insert_reservation(user, session, DomeLayout::new(5, 5), &[Seat::new(3, 3), Seat::new(1, n)])
                .await
        })
    });

    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, StoreError::SeatsTaken(_))));
    assert_eq!(store.occupied_seats(session).await.unwrap().len(), 2);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn deleting_reservation_cascades_to_tickets() {
    let db = database().await;
    let store = PgBookingStore::new(db.pool.clone());
    let user = create_user(&db.pool).await;
    let (session, _) = create_session(&db.pool, 2, 2).await;

    let reservation = store
        .insert_reservation(user, session, DomeLayout::new(2, 2), &[Seat::new(1, 1), Seat::new(1, 2)])
        .await
        .unwrap();
    assert_eq!(store.reservation_owner(reservation.id).await.unwrap(), Some(user));

    let freed = store.delete_reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(freed.len(), 2);

    let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE reservation_id = $1")
        .bind(reservation.id)
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(left, 0);
    assert!(store.delete_reservation(reservation.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn stale_layout_and_missing_session_are_refused() {
    let db = database().await;
    let store = PgBookingStore::new(db.pool.clone());
    let user = create_user(&db.pool).await;
    let (session, _) = create_session(&db.pool, 2, 2).await;

    let bigger = create_dome(&db.pool, 10, 10).await;
    sqlx::query("UPDATE show_sessions SET planetarium_dome_id = $1 WHERE id = $2")
        .bind(bigger)
        .bind(session)
        .execute(&db.pool)
        .await
        .unwrap();

    let err = store
        .insert_reservation(user, session, DomeLayout::new(2, 2), &[Seat::new(1, 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::LayoutChanged(id) if id == session));
    assert_eq!(store.session_layout(session).await.unwrap(), Some(DomeLayout::new(10, 10)));

    let err = store
        .insert_reservation(user, -1, DomeLayout::new(2, 2), &[Seat::new(1, 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::SessionNotFound(-1)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs DATABASE_URL"]
async fn reversed_overlapping_batches_lose_with_seats_taken() {
    let db = database().await;
    let store = Arc::new(PgBookingStore::new(db.pool.clone()));
    let user = create_user(&db.pool).await;

    let mut sessions = Vec::new();
    for _ in 0..20 {
        sessions.push(create_session(&db.pool, 1, 50).await.0);
    }

    let forward: Vec<Seat> = (1..=50).map(|n| Seat::new(1, n)).collect();
    let backward: Vec<Seat> = forward.iter().rev().copied().collect();

    let attempts = sessions.iter().flat_map(|&session| {
        [forward.clone(), backward.clone()].map(|seats| {
            let store = store.clone();
            tokio::spawn(async move {
                store.insert_reservation(user, session, DomeLayout::new(1, 50), &seats).await
            })
        })
    });

    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), sessions.len());
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, StoreError::SeatsTaken(seats) if !seats.is_empty()), "{err:?}");
    }
}
