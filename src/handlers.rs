use std::collections::HashMap;

use axum::{
    Json,
    extract::{Multipart, Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, ErrorBody},
    models::{
        AuthResponse, CreatePlaceForm, ImageRef, LoginRequest, MessageResponse, Place,
        PlaceEnvelope, PlacesEnvelope, SignupForm, UpdatePlaceRequest, UploadedFile, User,
        UserResponse, UsersEnvelope, normalize_email,
    },
    repository::{
        DUPLICATE_EMAIL_MESSAGE, OWNER_NOT_FOUND_MESSAGE, PLACE_NOT_FOUND_MESSAGE, RepositoryState,
    },
    storage::{StorageState, image_key},
};

const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials, could not log you in.";

// --- Multipart Helpers ---

/// MultipartBody
///
/// Text fields and the optional `image` file of a multipart request.
#[derive(Default)]
struct MultipartBody {
    fields: HashMap<String, String>,
    image: Option<UploadedFile>,
}

impl MultipartBody {
    /// Removes a text field, trimmed. Missing fields read as empty and fail validation.
    fn take(&mut self, name: &str) -> String {
        self.fields
            .remove(name)
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    }

    /// The uploaded image. Anything that is not a non-empty `image/*` part is rejected.
    fn take_image(&mut self) -> Result<UploadedFile, AppError> {
        self.image
            .take()
            .filter(|file| !file.bytes.is_empty() && file.content_type.starts_with("image/"))
            .ok_or_else(AppError::invalid_input)
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<MultipartBody, AppError> {
    let mut body = MultipartBody::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "image" {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await?.to_vec();
            body.image = Some(UploadedFile {
                file_name,
                content_type,
                bytes,
            });
        } else {
            let value = field.text().await?;
            body.fields.insert(name, value);
        }
    }

    Ok(body)
}

/// Uploads a validated image to the blob store under a fresh key.
async fn store_image(storage: &StorageState, file: UploadedFile) -> Result<ImageRef, AppError> {
    let key = image_key(file.file_name.as_deref());
    let image = storage
        .put_object(&key, file.bytes, &file.content_type)
        .await?;
    Ok(image)
}

/// Ids in paths are UUIDs; anything else cannot name an existing entity.
fn parse_id(raw: &str, not_found_message: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(not_found_message.to_string()))
}

fn issue_token(state: &AppState, user: &User, failure: &str) -> Result<String, AppError> {
    state
        .tokens
        .issue(user.id, &user.email)
        .map_err(|e| AppError::internal(failure, e))
}

// --- User Handlers ---

/// get_users
///
/// [Public Route] Lists every user without password hashes.
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All users", body = UsersEnvelope),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn get_users(State(repo): State<RepositoryState>) -> Result<Json<UsersEnvelope>, AppError> {
    let users = repo.list_users().await?;
    Ok(Json(UsersEnvelope {
        users: users.into_iter().map(UserResponse::from).collect(),
    }))
}

/// signup
///
/// [Public Route] Registers a user from a multipart form (`name`, `email`,
/// `password`, `image`) and returns a bearer token.
///
/// *Flow*: validate the fields, reject a taken email, hash the password, upload
/// the image, then persist. If persisting fails the uploaded image is orphaned,
/// so the error carries its key for the cleanup middleware.
#[utoipa::path(
    post,
    path = "/api/users/signup",
    request_body(content = crate::models::SignupUpload, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Signed up", body = AuthResponse),
        (status = 413, description = "Upload too large", body = ErrorBody),
        (status = 422, description = "Invalid input or email taken", body = ErrorBody),
        (status = 500, description = "Hashing or store failure", body = ErrorBody)
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let mut body = read_multipart(multipart).await?;
    let form = SignupForm {
        name: body.take("name"),
        email: body.take("email"),
        password: body.fields.remove("password").unwrap_or_default(),
    };
    form.validate()?;
    let file = body.take_image()?;

    let email = normalize_email(&form.email);
    if state.repo.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(DUPLICATE_EMAIL_MESSAGE.to_string()));
    }

    let password_hash = state
        .hasher
        .hash(&form.password)
        .await
        .map_err(|e| AppError::internal("Could not create user, please try again.", e))?;

    let image = store_image(&state.storage, file).await?;

    let new_user = User {
        id: Uuid::new_v4(),
        name: form.name,
        email,
        password_hash,
        image_url: image.url,
        image_key: image.key.clone(),
        place_ids: Vec::new(),
        created_at: Utc::now(),
    };

    let user = state
        .repo
        .create_user(new_user)
        .await
        .map_err(|e| AppError::from(e).with_orphaned_upload(image.key))?;

    tracing::info!(user_id = %user.id, "user signed up");

    let token = issue_token(&state, &user, "Signing up failed, please try again.")?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id: user.id,
            email: user.email,
            token,
        }),
    ))
}

/// login
///
/// [Public Route] Exchanges email and password for a bearer token.
///
/// An unknown email is a 403 and a wrong password a 401; both use the same message.
#[utoipa::path(
    post,
    path = "/api/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Wrong password", body = ErrorBody),
        (status = 403, description = "Unknown email", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = payload.map_err(|_| AppError::invalid_input())?;
    let email = normalize_email(&payload.email);

    let Some(user) = state.repo.find_user_by_email(&email).await? else {
        return Err(AppError::Forbidden(INVALID_CREDENTIALS_MESSAGE.to_string()));
    };

    let is_valid_password = state
        .hasher
        .verify(&payload.password, &user.password_hash)
        .await
        .map_err(|e| {
            AppError::internal(
                "Could not log you in, please check your credentials and try again.",
                e,
            )
        })?;

    if !is_valid_password {
        return Err(AppError::InvalidCredentials(
            INVALID_CREDENTIALS_MESSAGE.to_string(),
        ));
    }

    let token = issue_token(&state, &user, "Logging in failed, please try again.")?;
    Ok(Json(AuthResponse {
        user_id: user.id,
        email: user.email,
        token,
    }))
}

// --- Place Handlers ---

/// get_place_by_id
///
/// [Public Route] Retrieves a single place.
#[utoipa::path(
    get,
    path = "/api/places/{pid}",
    params(("pid" = Uuid, Path, description = "Place ID")),
    responses(
        (status = 200, description = "Found", body = PlaceEnvelope),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_place_by_id(
    State(repo): State<RepositoryState>,
    Path(pid): Path<String>,
) -> Result<Json<PlaceEnvelope>, AppError> {
    let id = parse_id(&pid, PLACE_NOT_FOUND_MESSAGE)?;
    let place = repo
        .get_place(id)
        .await?
        .ok_or_else(|| AppError::NotFound(PLACE_NOT_FOUND_MESSAGE.to_string()))?;

    Ok(Json(PlaceEnvelope {
        place: place.into(),
    }))
}

/// get_places_by_user_id
///
/// [Public Route] Lists the places a user created. A user without places is a 404.
#[utoipa::path(
    get,
    path = "/api/places/user/{uid}",
    params(("uid" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Places of the user", body = PlacesEnvelope),
        (status = 404, description = "No places", body = ErrorBody)
    )
)]
pub async fn get_places_by_user_id(
    State(repo): State<RepositoryState>,
    Path(uid): Path<String>,
) -> Result<Json<PlacesEnvelope>, AppError> {
    const NO_PLACES: &str = "Could not find places for the provided user id.";

    let user_id = parse_id(&uid, NO_PLACES)?;
    let places = repo.get_places_by_creator(user_id).await?;
    if places.is_empty() {
        return Err(AppError::NotFound(NO_PLACES.to_string()));
    }

    Ok(Json(PlacesEnvelope {
        places: places.into_iter().map(Into::into).collect(),
    }))
}

/// create_place
///
/// [Authenticated Route] Creates a place from a multipart form (`title`,
/// `description`, `address`, `image`). The creator is always the authenticated user.
///
/// *Flow*: validate, geocode, confirm the user still exists, upload the image,
/// then insert the place and attach it to the user in one transaction.
#[utoipa::path(
    post,
    path = "/api/places",
    request_body(content = crate::models::CreatePlaceUpload, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Created", body = PlaceEnvelope),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "User missing", body = ErrorBody),
        (status = 413, description = "Upload too large", body = ErrorBody),
        (status = 422, description = "Invalid input or unresolvable address", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn create_place(
    user: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<PlaceEnvelope>), AppError> {
    let mut body = read_multipart(multipart).await?;
    let form = CreatePlaceForm {
        title: body.take("title"),
        description: body.take("description"),
        address: body.take("address"),
    };
    form.validate()?;
    let file = body.take_image()?;

    let location = state.geocoder.geocode(&form.address).await?;

    if state.repo.get_user(user.id).await?.is_none() {
        return Err(AppError::NotFound(OWNER_NOT_FOUND_MESSAGE.to_string()));
    }

    let image = store_image(&state.storage, file).await?;

    let place = Place {
        id: Uuid::new_v4(),
        title: form.title,
        description: form.description,
        address: form.address,
        lat: location.lat,
        lng: location.lng,
        image_url: image.url,
        image_key: image.key.clone(),
        creator_id: user.id,
        created_at: Utc::now(),
    };

    let created = state
        .repo
        .insert_place_for_owner(place)
        .await
        .map_err(|e| AppError::from(e).with_orphaned_upload(image.key))?;

    tracing::info!(place_id = %created.id, user_id = %user.id, "place created");

    Ok((
        StatusCode::CREATED,
        Json(PlaceEnvelope {
            place: created.into(),
        }),
    ))
}

/// update_place
///
/// [Authenticated Route] Edits title and description. Owner-only.
///
/// *Authorization*: existence is checked first (404), then ownership (403).
#[utoipa::path(
    patch,
    path = "/api/places/{pid}",
    params(("pid" = Uuid, Path, description = "Place ID")),
    request_body = UpdatePlaceRequest,
    responses(
        (status = 200, description = "Updated", body = PlaceEnvelope),
        (status = 403, description = "Not Owner", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn update_place(
    user: AuthUser,
    State(repo): State<RepositoryState>,
    Path(pid): Path<String>,
    payload: Result<Json<UpdatePlaceRequest>, JsonRejection>,
) -> Result<Json<PlaceEnvelope>, AppError> {
    let Json(mut payload) = payload.map_err(|_| AppError::invalid_input())?;
    payload.title = payload.title.trim().to_string();
    payload.description = payload.description.trim().to_string();
    payload.validate()?;

    let id = parse_id(&pid, PLACE_NOT_FOUND_MESSAGE)?;
    let place = repo
        .get_place(id)
        .await?
        .ok_or_else(|| AppError::NotFound(PLACE_NOT_FOUND_MESSAGE.to_string()))?;

    if !place.is_owned_by(user.id) {
        return Err(AppError::Forbidden(
            "You are not allowed to edit this place.".to_string(),
        ));
    }

    let updated = repo
        .update_place_details(id, &payload.title, &payload.description)
        .await?
        .ok_or_else(|| AppError::NotFound(PLACE_NOT_FOUND_MESSAGE.to_string()))?;

    Ok(Json(PlaceEnvelope {
        place: updated.into(),
    }))
}

/// delete_place
///
/// [Authenticated Route] Deletes a place and detaches it from its owner in one
/// transaction. Owner-only.
///
/// The image is removed only after the transaction commits, and a failure to
/// remove it is logged rather than returned.
#[utoipa::path(
    delete,
    path = "/api/places/{pid}",
    params(("pid" = Uuid, Path, description = "Place ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not Owner", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn delete_place(
    user: AuthUser,
    State(state): State<AppState>,
    Path(pid): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = parse_id(&pid, PLACE_NOT_FOUND_MESSAGE)?;
    let place = state
        .repo
        .get_place(id)
        .await?
        .ok_or_else(|| AppError::NotFound(PLACE_NOT_FOUND_MESSAGE.to_string()))?;

    if !place.is_owned_by(user.id) {
        return Err(AppError::Forbidden(
            "You are not allowed to delete this place.".to_string(),
        ));
    }

    state.repo.delete_place_for_owner(place.id, user.id).await?;
    tracing::info!(place_id = %place.id, user_id = %user.id, "place deleted");

    if let Err(e) = state.storage.delete_object(&place.image_key).await {
        tracing::warn!(place_id = %place.id, error = %e, "failed to delete place image");
    }

    Ok(Json(MessageResponse {
        message: "Deleted place.".to_string(),
    }))
}

/// not_found
///
/// Fallback for every unknown route.
pub async fn not_found() -> AppError {
    AppError::NotFound("Could not find this route.".to_string())
}
