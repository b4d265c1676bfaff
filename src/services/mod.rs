pub mod ledger;
pub mod media;
pub mod store;

pub use ledger::{BookingLedger, CancelledReservation, LedgerError};
pub use media::MediaStorage;
