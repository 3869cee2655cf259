use axum::extract::{Query, State};
use axum::response::Response;
use chrono::Utc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::services::conferences::{
    self, CreateConferenceRequest, UpcomingQuery, UpdateConferenceRequest,
};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::{JsonBody, PathParam};
use crate::utils::response::{created, empty_success, success};

pub async fn create_conference(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    JsonBody(body): JsonBody<CreateConferenceRequest>,
) -> Result<Response, AppError> {
    let conference = conferences::create_conference(&state, &identity, body).await?;
    Ok(created(conference, "Conference created"))
}

pub async fn get_conference(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, AppError> {
    let conference = conferences::get_conference(&state, id).await?;
    Ok(success(conference, "Conference retrieved"))
}

pub async fn upcoming_conferences(
    State(state): State<AppState>,
    Query(query): Query<UpcomingQuery>,
) -> Result<Response, AppError> {
    let found = conferences::upcoming_conferences(&state, query.days.as_deref(), Utc::now()).await?;
    let message = format!("{} upcoming conference(s)", found.len());
    Ok(success(found, message))
}

pub async fn update_conference(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<UpdateConferenceRequest>,
) -> Result<Response, AppError> {
    let conference = conferences::update_conference(&state, &identity, id, body).await?;
    Ok(success(conference, "Conference updated"))
}

pub async fn delete_conference(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, AppError> {
    conferences::delete_conference(&state, &identity, id).await?;
    Ok(empty_success("Conference deleted"))
}
