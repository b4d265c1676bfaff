use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use planetarium::models::{DomeLayout, Seat};
use planetarium::services::store::MemoryBookingStore;
use planetarium::services::BookingLedger;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

fn ledger_with_dome(rt: &tokio::runtime::Runtime, rows: i32, seats_in_row: i32) -> BookingLedger {
    let store = Arc::new(MemoryBookingStore::new());
    rt.block_on(store.add_session(1, DomeLayout::new(rows, seats_in_row)));
    BookingLedger::new(store)
}

fn book_and_cancel(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("book_and_cancel");

    for batch in [1, 10, 50] {
        let ledger = ledger_with_dome(&rt, 20, 50);
        let seats: Vec<Seat> = (1..=batch).map(|seat| Seat::new(1, seat)).collect();

        group.bench_with_input(BenchmarkId::from_parameter(batch), &seats, |b, seats| {
            b.iter(|| {
                rt.block_on(async {
                    let reservation = ledger.create_reservation(7, 1, black_box(seats)).await.unwrap();
                    ledger.cancel_reservation(reservation.id, 7).await.unwrap();
                })
            })
        });
    }

    group.finish();
}

fn available_seats(c: &mut Criterion) {
    let rt = runtime();
    let ledger = ledger_with_dome(&rt, 30, 40);

    // Половина зала продана
    rt.block_on(async {
        for row in (1..=30).step_by(2) {
            let seats: Vec<Seat> = (1..=40).map(|seat| Seat::new(row, seat)).collect();
            ledger.create_reservation(row.into(), 1, &seats).await.unwrap();
        }
    });

    c.bench_function("list_available_seats_half_full", |b| {
        b.iter(|| rt.block_on(ledger.list_available_seats(black_box(1))).unwrap())
    });
}

criterion_group!(benches, book_and_cancel, available_seats);
criterion_main!(benches);
