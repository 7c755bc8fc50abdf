//! Digital room key service.
//!
//! Issues, activates, extends and revokes digital room keys for hotel
//! reservations, delivers the wallet passes to guests, and answers NFC lock
//! verification requests.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
pub mod store;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Build the HTTP router.
///
/// `/health` and `/api/v1/verify/key` are public; every other route sits
/// behind bearer token authentication.
pub fn router(state: AppState) -> Router {
    let authenticated_routes = Router::new()
        .route(
            "/api/v1/keys",
            post(handlers::keys::create_key).get(handlers::keys::list_keys),
        )
        .route("/api/v1/keys/{id}", get(handlers::keys::get_key))
        .route(
            "/api/v1/keys/{id}/activate",
            patch(handlers::keys::activate_key),
        )
        .route(
            "/api/v1/keys/{id}/deactivate",
            patch(handlers::keys::deactivate_key),
        )
        .route("/api/v1/keys/{id}/extend", patch(handlers::keys::extend_key))
        .route("/api/v1/keys/{id}/revoke", patch(handlers::keys::revoke_key))
        .route(
            "/api/v1/keys/{id}/regenerate",
            post(handlers::keys::regenerate_key),
        )
        .route(
            "/api/v1/keys/{id}/send-email",
            post(handlers::keys::send_email),
        )
        .route("/api/v1/keys/{id}/send-sms", post(handlers::keys::send_sms))
        .route("/api/v1/keys/{id}/events", get(handlers::keys::key_events))
        .route(
            "/api/v1/keys/{id}/access-events",
            get(handlers::keys::access_events),
        )
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        .route("/api/v1/verify/key", post(handlers::verify::verify_key))
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
