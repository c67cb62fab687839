use crate::{AppState, auth, handlers};
use axum::{
    Router, middleware,
    routing::{patch, post},
};

/// Authenticated Router Module
///
/// Every handler here is wrapped by `auth::require_auth`, so it only runs with a
/// verified `AuthUser`. Ownership of the target place is checked inside the
/// update and delete handlers.
///
/// The gate is a `route_layer` on each method router rather than on the whole
/// router: it runs only once a method matched, so an unsupported method on a
/// path shared with the public routes still answers 405.
pub fn authenticated_routes(state: AppState) -> Router<AppState> {
    let gate = middleware::from_fn_with_state(state, auth::require_auth);

    Router::<AppState>::new()
        // POST /api/places (multipart: title, description, address, image)
        .route(
            "/api/places",
            post(handlers::create_place).route_layer(gate.clone()),
        )
        // PATCH/DELETE /api/places/{pid}
        // Owner-only edits and removal.
        .route(
            "/api/places/{pid}",
            patch(handlers::update_place)
                .delete(handlers::delete_place)
                .route_layer(gate),
        )
}
