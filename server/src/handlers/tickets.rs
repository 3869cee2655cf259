use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::services::tickets::{self, UpdateTicketRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::{JsonBody, PathParam};
use crate::utils::response::success;

pub async fn tickets_for_booking(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    PathParam(booking_id): PathParam<Uuid>,
) -> Result<Response, AppError> {
    let issued = tickets::tickets_for_booking(&state, &identity, booking_id).await?;
    let message = format!("{} ticket(s)", issued.len());
    Ok(success(issued, message))
}

pub async fn update_ticket(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<UpdateTicketRequest>,
) -> Result<Response, AppError> {
    let ticket = tickets::update_ticket_code(&state, &identity, id, body, Utc::now()).await?;
    Ok(success(ticket, "Ticket updated"))
}
