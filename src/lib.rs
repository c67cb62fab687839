use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    http::HeaderName,
    middleware,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod geocoding;
pub mod handlers;
pub mod models;
pub mod password;
pub mod repository;
pub mod storage;

// Routers split by access level (public vs. bearer-protected).
pub mod routes;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use auth::{AuthUser, TokenService};
pub use config::AppConfig;
pub use error::{AppError, ErrorKind};
pub use geocoding::{GeocoderState, GoogleGeocoder, MockGeocoder};
pub use password::PasswordHasher;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// Upper bound on request bodies; multipart image uploads are the large ones.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// ApiDoc
///
/// OpenAPI document for every route, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_users, handlers::signup, handlers::login,
        handlers::get_place_by_id, handlers::get_places_by_user_id,
        handlers::create_place, handlers::update_place, handlers::delete_place
    ),
    components(
        schemas(
            models::UserResponse, models::PlaceResponse, models::ImageRef, models::Location,
            models::UsersEnvelope, models::PlaceEnvelope, models::PlacesEnvelope,
            models::MessageResponse, models::AuthResponse, models::LoginRequest,
            models::UpdatePlaceRequest, models::SignupUpload, models::CreatePlaceUpload,
            error::ErrorBody,
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "places", description = "Places API")
    )
)]
struct ApiDoc;

/// Registers the `bearer` scheme referenced by the protected routes.
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// AppState
///
/// The single, cloneable container of every service a handler may need. All
/// authoritative state lives behind `repo`; nothing here is mutable per request.
#[derive(Clone)]
pub struct AppState {
    /// Users and places.
    pub repo: RepositoryState,
    /// Image blob store.
    pub storage: StorageState,
    /// Address → coordinates.
    pub geocoder: GeocoderState,
    /// Bearer token issuer/verifier.
    pub tokens: TokenService,
    pub hasher: PasswordHasher,
    pub config: AppConfig,
}

impl AppState {
    /// Builds the state, deriving the token service and hasher from `config`.
    pub fn new(
        config: AppConfig,
        repo: RepositoryState,
        storage: StorageState,
        geocoder: GeocoderState,
    ) -> Self {
        Self {
            tokens: TokenService::new(&config.jwt_secret),
            hasher: PasswordHasher::new(config.bcrypt_cost),
            repo,
            storage,
            geocoder,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for TokenService {
    fn from_ref(app_state: &AppState) -> TokenService {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles every route, the authorization gate, the upload cleanup layer and
/// the observability stack.
pub fn create_router(state: AppState) -> Router {
    // Any origin, method and header: the SPA frontend is served from elsewhere.
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: no gate.
        .merge(public::public_routes())
        // Authenticated Routes: the gate runs before any handler logic.
        .merge(authenticated::authenticated_routes(state.clone()))
        .fallback(handlers::not_found)
        // Removes images orphaned by failed requests.
        .layer(middleware::from_fn_with_state(
            state.storage.clone(),
            error::cleanup_orphaned_uploads,
        ))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span with the request id; `user_id` is filled in by
/// the authorization gate once the caller is known.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
        user_id = tracing::field::Empty,
    )
}
