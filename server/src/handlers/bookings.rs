use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::services::bookings::{self, CreateBookingRequest, UpdateBookingRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::{JsonBody, PathParam};
use crate::utils::response::{created, empty_success, success};

pub async fn create_booking(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    JsonBody(body): JsonBody<CreateBookingRequest>,
) -> Result<Response, AppError> {
    let receipt = bookings::create_booking(&state, &identity, body, Utc::now()).await?;
    let message = receipt.message.clone();
    Ok(created(receipt, message))
}

pub async fn get_booking(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, AppError> {
    let booking = bookings::get_booking(&state, &identity, id).await?;
    Ok(success(booking, "Booking retrieved"))
}

pub async fn update_booking(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<UpdateBookingRequest>,
) -> Result<Response, AppError> {
    let booking = bookings::update_booking(&state, &identity, id, body, Utc::now()).await?;
    Ok(success(booking, "Booking updated"))
}

pub async fn delete_booking(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, AppError> {
    bookings::delete_booking(&state, &identity, id, Utc::now()).await?;
    Ok(empty_success("Booking deleted"))
}
