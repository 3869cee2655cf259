use axum::extract::State;
use axum::response::Response;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::services::users::{self, UpdateUserRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::{JsonBody, PathParam};
use crate::utils::response::{empty_success, success};

pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, AppError> {
    let user = users::get_user(&state, &identity, id).await?;
    Ok(success(user, "User retrieved"))
}

pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<UpdateUserRequest>,
) -> Result<Response, AppError> {
    let user = users::update_user(&state, &identity, id, body).await?;
    Ok(success(user, "User updated"))
}

pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, AppError> {
    users::delete_user(&state, &identity, id).await?;
    Ok(empty_success("User deleted"))
}
