use axum::extract::State;
use axum::response::Response;

use crate::services::users::{self, LoginRequest, RegisterRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::JsonBody;
use crate::utils::response::{created, empty_success, success};

pub async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> Result<Response, AppError> {
    let auth = users::register(&state, body).await?;
    Ok(created(auth, "User registered successfully"))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> Result<Response, AppError> {
    let auth = users::login(&state, body).await?;
    Ok(success(auth, "Login successful"))
}

/// Tokens are stateless; the client discards its copy.
pub async fn logout() -> Response {
    empty_success("Logged out. Discard your token.")
}
