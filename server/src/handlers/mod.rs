pub mod auth;
pub mod bookings;
pub mod conferences;
pub mod health;
pub mod tickets;
pub mod users;

pub use health::health_check;
