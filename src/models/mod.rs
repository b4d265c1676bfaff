pub mod user;
pub mod show;
pub mod dome;
pub mod session;
pub mod seat;
pub mod reservation;

pub use user::User;
pub use show::{AstronomyShow, ShowTheme};
pub use dome::{DomeLayout, PlanetariumDome};
pub use session::ShowSession;
pub use seat::Seat;
pub use reservation::{Reservation, Ticket};
