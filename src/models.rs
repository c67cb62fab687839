use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// A row of the `users` table. Carries the password hash, so it is never
/// serialized to clients directly; see `UserResponse`.
#[derive(Debug, Clone, FromRow, Default, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    // Always stored normalized (see `normalize_email`).
    pub email: String,
    pub password_hash: String,
    pub image_url: String,
    pub image_key: String,
    // Back-references to every place this user created.
    pub place_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Place
///
/// A row of the `places` table.
#[derive(Debug, Clone, FromRow, Default, PartialEq)]
pub struct Place {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub image_url: String,
    pub image_key: String,
    // Immutable once the place is created.
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Place {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.creator_id == user_id
    }
}

/// Trims and lower-cases an email so lookups and the unique index agree.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// --- Shared Value Objects ---

/// ImageRef
///
/// Where an uploaded image lives: its public URL and the key used to delete it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct ImageRef {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

// --- Response Payloads (Output Schemas) ---

/// UserResponse
///
/// Public view of a user. The password hash is deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub image: ImageRef,
    pub places: Vec<Uuid>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            image: ImageRef {
                url: user.image_url,
                key: user.image_key,
            },
            places: user.place_ids,
        }
    }
}

/// PlaceResponse
///
/// Public view of a place.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct PlaceResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub address: String,
    pub location: Location,
    pub image: ImageRef,
    pub creator: Uuid,
}

impl From<Place> for PlaceResponse {
    fn from(place: Place) -> Self {
        Self {
            id: place.id,
            title: place.title,
            description: place.description,
            address: place.address,
            location: Location {
                lat: place.lat,
                lng: place.lng,
            },
            image: ImageRef {
                url: place.image_url,
                key: place.image_key,
            },
            creator: place.creator_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UsersEnvelope {
    pub users: Vec<UserResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PlaceEnvelope {
    pub place: PlaceResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PlacesEnvelope {
    pub places: Vec<PlaceResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

/// AuthResponse
///
/// Returned by signup and login: the identity plus a freshly issued bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
}

// --- Request Payloads (Input Schemas) ---

/// LoginRequest
///
/// JSON body of `POST /api/users/login`. No field rules beyond presence.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// UpdatePlaceRequest
///
/// JSON body of `PATCH /api/places/{pid}`. Only title and description are editable.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct UpdatePlaceRequest {
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 5))]
    pub description: String,
}

/// SignupForm
///
/// Text fields of the multipart signup request, validated before anything is stored.
#[derive(Debug, Clone, Default, Validate)]
pub struct SignupForm {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
}

/// CreatePlaceForm
///
/// Text fields of the multipart create-place request.
#[derive(Debug, Clone, Default, Validate)]
pub struct CreatePlaceForm {
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 5))]
    pub description: String,
    #[validate(length(min = 1))]
    pub address: String,
}

/// UploadedFile
///
/// The `image` part of a multipart request, held in memory until it is stored.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

// --- OpenAPI-only Schemas ---

/// Documents the multipart body of the signup endpoint.
#[derive(ToSchema)]
pub struct SignupUpload {
    pub name: String,
    pub email: String,
    pub password: String,
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}

/// Documents the multipart body of the create-place endpoint.
#[derive(ToSchema)]
pub struct CreatePlaceUpload {
    pub title: String,
    pub description: String,
    pub address: String,
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}
