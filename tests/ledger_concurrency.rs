use futures::future::join_all;
use std::sync::Arc;

use planetarium::models::{DomeLayout, Seat};
use planetarium::services::store::MemoryBookingStore;
use planetarium::services::{BookingLedger, LedgerError};

const SESSION: i64 = 1;

async fn setup(rows: i32, seats_in_row: i32) -> (BookingLedger, Arc<MemoryBookingStore>) {
    let store = Arc::new(MemoryBookingStore::new());
    store.add_session(SESSION, DomeLayout::new(rows, seats_in_row)).await;
    (BookingLedger::new(store.clone()), store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_buyers_one_seat_one_winner() {
    let (ledger, store) = setup(10, 10).await;

    // Все хотят (1, 1) и ещё одно своё место
    let attempts = (1..=10).map(|n| {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .create_reservation(n, SESSION, &[Seat::new(1, 1), Seat::new(2, n as i32)])
                .await
        })
    });

    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);

    for result in results.iter().filter(|r| r.is_err()) {
        match result {
            Err(LedgerError::SeatAlreadyTaken { seats }) => assert_eq!(seats, &vec![Seat::new(1, 1)]),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    // Проигравшие не оставили ни одного билета
    assert_eq!(store.ticket_count().await, 2);
    let stored = store.reservation(winners[0].id).await.unwrap();
    assert_eq!(stored.tickets.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_batches_all_succeed() {
    let (ledger, store) = setup(4, 5).await;

    let attempts = (1..=4).map(|row| {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            let seats: Vec<Seat> = (1..=5).map(|seat| Seat::new(row, seat)).collect();
            ledger.create_reservation(i64::from(row), SESSION, &seats).await
        })
    });

    for joined in join_all(attempts).await {
        assert!(joined.unwrap().is_ok());
    }

    assert_eq!(store.ticket_count().await, 20);
    assert!(ledger.list_available_seats(SESSION).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_seats_can_be_booked_again() {
    let (ledger, _) = setup(2, 2).await;
    let first = ledger.create_reservation(1, SESSION, &[Seat::new(2, 2)]).await.unwrap();

    let err = ledger.create_reservation(2, SESSION, &[Seat::new(2, 2)]).await.unwrap_err();
    assert!(matches!(err, LedgerError::SeatAlreadyTaken { .. }));

    let cancelled = ledger.cancel_reservation(first.id, 1).await.unwrap();
    assert_eq!(cancelled.freed.iter().map(|t| t.seat()).collect::<Vec<_>>(), vec![Seat::new(2, 2)]);

    let second = ledger.create_reservation(2, SESSION, &[Seat::new(2, 2)]).await.unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(ledger.taken_seats(SESSION).await.unwrap(), vec![Seat::new(2, 2)]);
}
