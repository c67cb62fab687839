use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that never pass through the authorization gate: read-only lookups
/// and the two identity-establishing operations.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /api/users
        .route("/api/users", get(handlers::get_users))
        // POST /api/users/signup (multipart: name, email, password, image)
        .route("/api/users/signup", post(handlers::signup))
        // POST /api/users/login
        .route("/api/users/login", post(handlers::login))
        // GET /api/places/user/{uid}
        // The static `user` segment takes precedence over `{pid}` below.
        .route("/api/places/user/{uid}", get(handlers::get_places_by_user_id))
        // GET /api/places/{pid}
        .route("/api/places/{pid}", get(handlers::get_place_by_id))
}
