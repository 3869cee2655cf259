use std::sync::Arc;
use std::time::Duration;

use crate::auth::ClaimIssuer;
use crate::store::Store;

/// Shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub claims: Arc<ClaimIssuer>,
    /// Upper bound on any single unit of work.
    pub tx_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, claims: ClaimIssuer, tx_timeout: Duration) -> Self {
        Self {
            store,
            claims: Arc::new(claims),
            tx_timeout,
        }
    }
}
