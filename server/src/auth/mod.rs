//! Identity: password credentials, signed claims, and the authorization gate.

pub mod claims;
pub mod extractor;
pub mod gate;
pub mod password;

use uuid::Uuid;

use crate::models::Role;

pub use claims::ClaimIssuer;
pub use extractor::AuthUser;

/// Verified caller identity, produced only by [`ClaimIssuer::verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}
