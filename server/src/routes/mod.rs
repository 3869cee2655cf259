use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{auth, bookings, conferences, health_check, tickets, users};
use crate::middleware::{rate_limit, RateLimiter};
use crate::state::AppState;
use crate::utils::error::AppError;

pub fn create_routes(
    state: AppState,
    limiter: Arc<RateLimiter>,
    cors_allowed_origins: &[String],
    production: bool,
) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/auth", auth_routes())
        .nest("/users", user_routes())
        .nest("/conferences", conference_routes())
        .nest("/bookings", booking_routes())
        .nest("/tickets", ticket_routes())
        .fallback(|| async { AppError::NotFound("route not found".to_string()) })
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(limiter, rate_limit))
        .layer(create_security_headers_layer(production))
        .layer(create_cors_layer(cors_allowed_origins))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
}

fn user_routes() -> Router<AppState> {
    Router::new().route(
        "/:id",
        get(users::get_user)
            .put(users::update_user)
            .delete(users::delete_user),
    )
}

fn conference_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(conferences::create_conference))
        .route("/upcoming", get(conferences::upcoming_conferences))
        .route(
            "/:id",
            get(conferences::get_conference)
                .put(conferences::update_conference)
                .delete(conferences::delete_conference),
        )
}

fn booking_routes() -> Router<AppState> {
    Router::new().route("/", post(bookings::create_booking)).route(
        "/:id",
        get(bookings::get_booking)
            .put(bookings::update_booking)
            .delete(bookings::delete_booking),
    )
}

fn ticket_routes() -> Router<AppState> {
    Router::new()
        .route("/booking/:booking_id", get(tickets::tickets_for_booking))
        .route("/:id", put(tickets::update_ticket))
}
