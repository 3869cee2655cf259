pub mod booking;
pub mod conference;
pub mod ticket;
pub mod user;

pub use booking::{Booking, BookingStatus, NewBooking};
pub use conference::{Conference, ConferenceChanges, ConferenceStatus, NewConference};
pub use ticket::Ticket;
pub use user::{NewUser, Role, User};
