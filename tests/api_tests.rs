use axum::{
    body::{Body, to_bytes},
    http::Request,
};
use chrono::Utc;
use places_api::{
    AppConfig, AppState, InMemoryRepository, MAX_UPLOAD_BYTES, MockGeocoder, MockStorageService,
    PasswordHasher, TokenService, create_router,
    geocoding::GeocoderState,
    models::{
        AuthResponse, Location, MessageResponse, PlaceEnvelope, PlacesEnvelope, User,
        UsersEnvelope,
    },
    repository::{Repository, RepositoryState},
    storage::StorageState,
};
use reqwest::{
    StatusCode,
    multipart::{Form, Part},
};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;
use uuid::Uuid;

// --- Test Harness ---

struct TestApp {
    address: String,
    client: reqwest::Client,
    repo: Arc<InMemoryRepository>,
    storage: MockStorageService,
}

async fn spawn_app() -> TestApp {
    spawn_app_with(MockGeocoder::default(), MockStorageService::new()).await
}

async fn spawn_app_with_geocoder(geocoder: MockGeocoder) -> TestApp {
    spawn_app_with(geocoder, MockStorageService::new()).await
}

async fn spawn_app_with_storage(storage: MockStorageService) -> TestApp {
    spawn_app_with(MockGeocoder::default(), storage).await
}

fn test_state(
    repo: Arc<InMemoryRepository>,
    storage: MockStorageService,
    geocoder: MockGeocoder,
) -> AppState {
    let mut state = AppState::new(
        AppConfig::default(),
        repo as RepositoryState,
        Arc::new(storage) as StorageState,
        Arc::new(geocoder) as GeocoderState,
    );
    // Lowest bcrypt cost; hashing speed is not under test here.
    state.hasher = PasswordHasher::new(4);
    state
}

async fn spawn_app_with(geocoder: MockGeocoder, storage: MockStorageService) -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let router = create_router(test_state(repo.clone(), storage.clone(), geocoder));
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        repo,
        storage,
    }
}

fn image_part() -> Part {
    Part::bytes(vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a])
        .file_name("photo.png")
        .mime_str("image/png")
        .unwrap()
}

fn signup_form(name: &str, email: &str, password: &str) -> Form {
    Form::new()
        .text("name", name.to_string())
        .text("email", email.to_string())
        .text("password", password.to_string())
        .part("image", image_part())
}

fn place_form(title: &str, description: &str, address: &str) -> Form {
    Form::new()
        .text("title", title.to_string())
        .text("description", description.to_string())
        .text("address", address.to_string())
        .part("image", image_part())
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn signup(&self, name: &str, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/users/signup"))
            .multipart(signup_form(name, email, password))
            .send()
            .await
            .expect("signup request failed")
    }

    async fn signup_ok(&self, name: &str, email: &str) -> AuthResponse {
        let response = self.signup(name, email, "password123").await;
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.unwrap()
    }

    async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/users/login"))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("login request failed")
    }

    async fn create_place(&self, token: &str, form: Form) -> reqwest::Response {
        self.client
            .post(self.url("/api/places"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .expect("create request failed")
    }

    async fn create_place_ok(&self, token: &str, title: &str) -> PlaceEnvelope {
        let response = self
            .create_place(token, place_form(title, "A lovely spot", "1 Main St"))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.unwrap()
    }

    async fn delete_place(&self, token: &str, id: Uuid) -> reqwest::Response {
        self.client
            .delete(self.url(&format!("/api/places/{}", id)))
            .bearer_auth(token)
            .send()
            .await
            .expect("delete request failed")
    }
}

async fn error_message(response: reqwest::Response) -> String {
    let body: Value = response.json().await.unwrap();
    body["message"].as_str().unwrap_or_default().to_string()
}

// --- Routing & Health ---

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/health")).send().await.unwrap();
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/api/nowhere")).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_message(response).await, "Could not find this route.");
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/health")).send().await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

// --- Signup & Login ---

#[tokio::test]
async fn test_signup_returns_token_and_lists_user_without_hash() {
    let app = spawn_app().await;
    let auth = app.signup_ok("Ana", "Ana@Example.com ").await;

    assert_eq!(auth.email, "ana@example.com");
    assert!(!auth.token.is_empty());

    let response = app.client.get(app.url("/api/users")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let raw: Value = response.json().await.unwrap();
    let user = &raw["users"][0];
    assert_eq!(user["name"], "Ana");
    assert!(user.get("password").is_none());
    assert!(user.get("password_hash").is_none());
    assert_eq!(user["places"].as_array().unwrap().len(), 0);

    // The avatar was uploaded under the key the user record points at.
    let users: UsersEnvelope = serde_json::from_value(raw).unwrap();
    assert_eq!(app.storage.stored_keys(), vec![users.users[0].image.key.clone()]);
}

#[tokio::test]
async fn test_signup_duplicate_email_is_rejected() {
    let app = spawn_app().await;
    app.signup_ok("Ana", "ana@example.com").await;

    let response = app.signup("Other Ana", "ANA@example.com", "password123").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        error_message(response).await,
        "User exists already, please login instead."
    );
    // No second avatar was stored.
    assert_eq!(app.storage.stored_keys().len(), 1);
}

#[tokio::test]
async fn test_signup_validation_failures() {
    let app = spawn_app().await;

    let short_password = app.signup("Ana", "ana@example.com", "short").await;
    assert_eq!(short_password.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        error_message(short_password).await,
        "Invalid inputs passed, please check your data."
    );

    let bad_email = app.signup("Ana", "not-an-email", "password123").await;
    assert_eq!(bad_email.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let blank_name = app.signup("   ", "ana@example.com", "password123").await;
    assert_eq!(blank_name.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let no_image = app
        .client
        .post(app.url("/api/users/signup"))
        .multipart(
            Form::new()
                .text("name", "Ana")
                .text("email", "ana@example.com")
                .text("password", "password123"),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(no_image.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let not_an_image = app
        .client
        .post(app.url("/api/users/signup"))
        .multipart(
            Form::new()
                .text("name", "Ana")
                .text("email", "ana@example.com")
                .text("password", "password123")
                .part(
                    "image",
                    Part::bytes(b"plain text".to_vec())
                        .file_name("notes.txt")
                        .mime_str("text/plain")
                        .unwrap(),
                ),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(not_an_image.status(), StatusCode::UNPROCESSABLE_ENTITY);

    assert!(app.repo.list_users().await.unwrap().is_empty());
    assert!(app.storage.stored_keys().is_empty());
}

#[tokio::test]
async fn test_login_success_and_failures() {
    let app = spawn_app().await;
    let signed_up = app.signup_ok("Ana", "ana@example.com").await;

    let ok = app.login(" ANA@example.com", "password123").await;
    assert_eq!(ok.status(), StatusCode::OK);
    let auth: AuthResponse = ok.json().await.unwrap();
    assert_eq!(auth.user_id, signed_up.user_id);
    assert!(!auth.token.is_empty());

    let wrong_password = app.login("ana@example.com", "password124").await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        error_message(wrong_password).await,
        "Invalid credentials, could not log you in."
    );

    let unknown = app.login("nobody@example.com", "password123").await;
    assert_eq!(unknown.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        error_message(unknown).await,
        "Invalid credentials, could not log you in."
    );
}

#[tokio::test]
async fn test_login_response_uses_camel_case_user_id() {
    let app = spawn_app().await;
    app.signup_ok("Ana", "ana@example.com").await;

    let body: Value = app
        .login("ana@example.com", "password123")
        .await
        .json()
        .await
        .unwrap();
    assert!(body.get("userId").is_some());
    assert!(body.get("token").is_some());
}

#[tokio::test]
async fn test_login_with_malformed_json_is_invalid_input() {
    let app = spawn_app().await;
    let response = app
        .client
        .post(app.url("/api/users/login"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// --- Authorization Gate ---

#[tokio::test]
async fn test_protected_routes_require_a_valid_token() {
    let app = spawn_app().await;

    let no_token = app
        .client
        .post(app.url("/api/places"))
        .multipart(place_form("Cafe", "Good coffee", "1 Main St"))
        .send()
        .await
        .unwrap();
    assert_eq!(no_token.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_message(no_token).await, "Authentication failed.");

    let garbage = app
        .create_place("not.a.jwt", place_form("Cafe", "Good coffee", "1 Main St"))
        .await;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);

    let delete = app
        .client
        .delete(app.url(&format!("/api/places/{}", Uuid::new_v4())))
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status(), StatusCode::UNAUTHORIZED);

    // The gate rejected the request before any upload happened.
    assert!(app.storage.stored_keys().is_empty());
}

#[tokio::test]
async fn test_token_signed_with_another_secret_is_rejected() {
    let app = spawn_app().await;
    let auth = app.signup_ok("Ana", "ana@example.com").await;

    let forged = places_api::TokenService::new("some-other-secret")
        .issue(auth.user_id, &auth.email)
        .unwrap();
    let response = app
        .create_place(&forged, place_form("Cafe", "Good coffee", "1 Main St"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_public_get_on_shared_path_needs_no_token() {
    let app = spawn_app().await;
    let auth = app.signup_ok("Ana", "ana@example.com").await;
    let created = app.create_place_ok(&auth.token, "Cafe").await;

    let response = app
        .client
        .get(app.url(&format!("/api/places/{}", created.place.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// --- Places ---

#[tokio::test]
async fn test_create_place_links_both_sides() {
    let app = spawn_app().await;
    let auth = app.signup_ok("Ana", "ana@example.com").await;

    let created = app.create_place_ok(&auth.token, "Cafe").await.place;
    assert_eq!(created.creator, auth.user_id);
    assert_eq!(created.address, "1 Main St");
    assert_eq!(
        created.location,
        Location {
            lat: 40.7484474,
            lng: -73.9871516
        }
    );

    let owner = app.repo.get_user(auth.user_id).await.unwrap().unwrap();
    assert_eq!(owner.place_ids, vec![created.id]);

    let fetched: PlaceEnvelope = app
        .client
        .get(app.url(&format!("/api/places/{}", created.id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched.place, created);

    let listed: PlacesEnvelope = app
        .client
        .get(app.url(&format!("/api/places/user/{}", auth.user_id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.places, vec![created]);
}

#[tokio::test]
async fn test_create_place_validation_and_geocoding_errors() {
    let app = spawn_app().await;
    let auth = app.signup_ok("Ana", "ana@example.com").await;

    let short_description = app
        .create_place(&auth.token, place_form("Cafe", "meh", "1 Main St"))
        .await;
    assert_eq!(short_description.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let blank_address = app
        .create_place(&auth.token, place_form("Cafe", "Good coffee", "  "))
        .await;
    assert_eq!(blank_address.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let unresolvable = spawn_app_with_geocoder(MockGeocoder::unresolvable()).await;
    let auth = unresolvable.signup_ok("Ana", "ana@example.com").await;
    let response = unresolvable
        .create_place(&auth.token, place_form("Cafe", "Good coffee", "Nowhere"))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        error_message(response).await,
        "Could not find location for the specified address."
    );

    let unavailable = spawn_app_with_geocoder(MockGeocoder::unavailable()).await;
    let auth = unavailable.signup_ok("Ana", "ana@example.com").await;
    let response = unavailable
        .create_place(&auth.token, place_form("Cafe", "Good coffee", "1 Main St"))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Geocoding runs before the upload, so only the avatar is stored.
    assert_eq!(unavailable.storage.stored_keys().len(), 1);
}

#[tokio::test]
async fn test_create_place_for_deleted_token_owner_is_not_found() {
    let app = spawn_app().await;
    // A valid token whose subject was never stored.
    let token = places_api::TokenService::new(&AppConfig::default().jwt_secret)
        .issue(Uuid::new_v4(), "ghost@example.com")
        .unwrap();

    let response = app
        .create_place(&token, place_form("Cafe", "Good coffee", "1 Main St"))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.storage.stored_keys().is_empty());
}

#[tokio::test]
async fn test_failed_owner_attach_rolls_back_and_removes_upload() {
    let app = spawn_app().await;
    let auth = app.signup_ok("Ana", "ana@example.com").await;
    let avatar_keys = app.storage.stored_keys();

    app.repo.fail_next_owner_attach();
    let response = app
        .create_place(&auth.token, place_form("Cafe", "Good coffee", "1 Main St"))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Neither side of the relationship was written.
    let owner = app.repo.get_user(auth.user_id).await.unwrap().unwrap();
    assert!(owner.place_ids.is_empty());
    assert!(
        app.repo
            .get_places_by_creator(auth.user_id)
            .await
            .unwrap()
            .is_empty()
    );

    // The place image was uploaded, then cleaned up by the middleware.
    assert_eq!(app.storage.deleted_keys().len(), 1);
    assert_eq!(app.storage.stored_keys(), avatar_keys);
}

#[tokio::test]
async fn test_update_place_by_owner_and_by_stranger() {
    let app = spawn_app().await;
    let owner = app.signup_ok("Ana", "ana@example.com").await;
    let stranger = app.signup_ok("Bo", "bo@example.com").await;
    let place = app.create_place_ok(&owner.token, "Cafe").await.place;

    let url = app.url(&format!("/api/places/{}", place.id));

    let forbidden = app
        .client
        .patch(&url)
        .bearer_auth(&stranger.token)
        .json(&serde_json::json!({ "title": "Mine now", "description": "Taken over" }))
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        error_message(forbidden).await,
        "You are not allowed to edit this place."
    );
    let unchanged = app.repo.get_place(place.id).await.unwrap().unwrap();
    assert_eq!(unchanged.title, "Cafe");

    let invalid = app
        .client
        .patch(&url)
        .bearer_auth(&owner.token)
        .json(&serde_json::json!({ "title": "", "description": "Still fine" }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let updated = app
        .client
        .patch(&url)
        .bearer_auth(&owner.token)
        .json(&serde_json::json!({ "title": "Cafe Nero", "description": "Better coffee" }))
        .send()
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    let updated: PlaceEnvelope = updated.json().await.unwrap();
    assert_eq!(updated.place.title, "Cafe Nero");
    assert_eq!(updated.place.description, "Better coffee");
    // Only title and description are editable.
    assert_eq!(updated.place.address, place.address);
    assert_eq!(updated.place.creator, owner.user_id);
}

#[tokio::test]
async fn test_update_missing_place_is_not_found() {
    let app = spawn_app().await;
    let auth = app.signup_ok("Ana", "ana@example.com").await;

    let response = app
        .client
        .patch(app.url(&format!("/api/places/{}", Uuid::new_v4())))
        .bearer_auth(&auth.token)
        .json(&serde_json::json!({ "title": "Cafe", "description": "Good coffee" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_place_lifecycle_with_ownership() {
    let app = spawn_app().await;
    let ana = app.signup_ok("Ana", "ana@example.com").await;
    let bo = app.signup_ok("Bo", "bo@example.com").await;

    let cafe = app.create_place_ok(&ana.token, "Cafe").await.place;
    let park = app.create_place_ok(&ana.token, "Park").await.place;

    // Someone else cannot delete it.
    let forbidden = app.delete_place(&bo.token, cafe.id).await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    assert!(app.repo.get_place(cafe.id).await.unwrap().is_some());

    // The owner can.
    let deleted = app.delete_place(&ana.token, cafe.id).await;
    assert_eq!(deleted.status(), StatusCode::OK);
    let message: MessageResponse = deleted.json().await.unwrap();
    assert_eq!(message.message, "Deleted place.");

    let gone = app
        .client
        .get(app.url(&format!("/api/places/{}", cafe.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    let owner = app.repo.get_user(ana.user_id).await.unwrap().unwrap();
    assert_eq!(owner.place_ids, vec![park.id]);
    assert_eq!(app.storage.deleted_keys(), vec![cafe.image.key.clone()]);

    // Deleting twice is a 404.
    let again = app.delete_place(&ana.token, cafe.id).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_places_by_user_without_places_is_not_found() {
    let app = spawn_app().await;
    let auth = app.signup_ok("Ana", "ana@example.com").await;

    let response = app
        .client
        .get(app.url(&format!("/api/places/user/{}", auth.user_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        error_message(response).await,
        "Could not find places for the provided user id."
    );
}

#[tokio::test]
async fn test_non_uuid_place_id_is_not_found() {
    let app = spawn_app().await;
    let response = app
        .client
        .get(app.url("/api/places/p1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsupported_method_on_gated_path_is_405_not_401() {
    let app = spawn_app().await;

    let put = app
        .client
        .put(app.url(&format!("/api/places/{}", Uuid::new_v4())))
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), StatusCode::METHOD_NOT_ALLOWED);

    // Matched methods on the same path are still gated.
    let patch = app
        .client
        .patch(app.url(&format!("/api/places/{}", Uuid::new_v4())))
        .json(&serde_json::json!({ "title": "Cafe", "description": "Good coffee" }))
        .send()
        .await
        .unwrap();
    assert_eq!(patch.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bearer_scheme_is_case_insensitive() {
    let app = spawn_app().await;
    let auth = app.signup_ok("Ana", "ana@example.com").await;

    let response = app
        .client
        .post(app.url("/api/places"))
        .header("authorization", format!("bearer {}", auth.token))
        .multipart(place_form("Cafe", "Good coffee", "1 Main St"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

// --- Blob Store Failures ---

#[tokio::test]
async fn test_delete_succeeds_when_image_removal_fails() {
    let app = spawn_app_with_storage(MockStorageService::with_failing_deletes()).await;
    let auth = app.signup_ok("Ana", "ana@example.com").await;
    let place = app.create_place_ok(&auth.token, "Cafe").await.place;

    let response = app.delete_place(&auth.token, place.id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let message: MessageResponse = response.json().await.unwrap();
    assert_eq!(message.message, "Deleted place.");

    let gone = app
        .client
        .get(app.url(&format!("/api/places/{}", place.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    let owner = app.repo.get_user(auth.user_id).await.unwrap().unwrap();
    assert!(!owner.place_ids.contains(&place.id));

    // The removal was attempted; the blob is left behind.
    assert_eq!(app.storage.deleted_keys(), vec![place.image.key.clone()]);
    assert!(app.storage.stored_keys().contains(&place.image.key));
}

#[tokio::test]
async fn test_create_place_with_failing_upload_is_internal_error() {
    let app = spawn_app_with_storage(MockStorageService::new_failing()).await;

    // Signup uploads an avatar too, so the owner is seeded directly.
    let owner = app
        .repo
        .create_user(User {
            id: Uuid::new_v4(),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            image_url: "http://localhost:9000/mock-bucket/images/a.png".to_string(),
            image_key: "images/a.png".to_string(),
            place_ids: Vec::new(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    let token = TokenService::new(&AppConfig::default().jwt_secret)
        .issue(owner.id, &owner.email)
        .unwrap();

    let response = app
        .create_place(&token, place_form("Cafe", "Good coffee", "1 Main St"))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        error_message(response).await,
        "Could not store the uploaded image, please try again."
    );

    assert!(
        app.repo
            .get_places_by_creator(owner.id)
            .await
            .unwrap()
            .is_empty()
    );
    let owner = app.repo.get_user(owner.id).await.unwrap().unwrap();
    assert!(owner.place_ids.is_empty());
}

// --- Body Limits ---

#[tokio::test]
async fn test_oversized_upload_is_413() {
    let storage = MockStorageService::new();
    let router = create_router(test_state(
        Arc::new(InMemoryRepository::new()),
        storage.clone(),
        MockGeocoder::default(),
    ));

    let boundary = "places-test-boundary";
    let mut body = Vec::new();
    for (name, value) in [
        ("name", "Ana"),
        ("email", "ana@example.com"),
        ("password", "password123"),
    ] {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"big.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend(std::iter::repeat_n(0u8, MAX_UPLOAD_BYTES + 1024));
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/api/users/signup")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["message"], "The uploaded data is too large.");
    assert!(storage.stored_keys().is_empty());
}
