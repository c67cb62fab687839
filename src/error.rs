use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    geocoding::GeocodeError, password::PasswordError, repository::RepositoryError,
    storage::{StorageError, StorageState},
};

/// Message used for every rejected form or JSON payload.
pub const INVALID_INPUT_MESSAGE: &str = "Invalid inputs passed, please check your data.";

/// ErrorKind
///
/// The client-facing error taxonomy. Every failure in the application collapses
/// into exactly one of these before a response is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthorized,
    Forbidden,
    Conflict,
    PayloadTooLarge,
    Internal,
}

impl ErrorKind {
    /// status
    ///
    /// The single mapping from taxonomy kind to HTTP status code.
    pub const fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// AppError
///
/// Application error type returned by every handler. The `Display` output of each
/// variant is the message sent to the client, so internal details never go into it;
/// `Internal` keeps its cause separately for logging only.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Authentication failed.")]
    Unauthorized,

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("The uploaded data is too large.")]
    PayloadTooLarge,

    #[error("{message}")]
    Internal { message: String, cause: String },

    /// Wraps a failure that happened after an image was already uploaded, so the
    /// responder can remove the blob that no record will ever reference.
    #[error("{source}")]
    WithOrphanedUpload {
        source: Box<AppError>,
        upload_key: String,
    },
}

impl AppError {
    pub fn invalid_input() -> Self {
        AppError::Validation(INVALID_INPUT_MESSAGE.to_string())
    }

    /// internal
    ///
    /// Builds a 500 with a generic client message while keeping the real cause for the logs.
    pub fn internal(message: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        AppError::Internal {
            message: message.into(),
            cause: cause.to_string(),
        }
    }

    /// Attaches the key of an uploaded blob that should be cleaned up if this
    /// error reaches the client.
    pub fn with_orphaned_upload(self, upload_key: impl Into<String>) -> Self {
        AppError::WithOrphanedUpload {
            source: Box::new(self),
            upload_key: upload_key.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Unauthorized | AppError::InvalidCredentials(_) => ErrorKind::Unauthorized,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::PayloadTooLarge => ErrorKind::PayloadTooLarge,
            AppError::Internal { .. } => ErrorKind::Internal,
            AppError::WithOrphanedUpload { source, .. } => source.kind(),
        }
    }

    pub fn orphaned_upload(&self) -> Option<&str> {
        match self {
            AppError::WithOrphanedUpload { upload_key, .. } => Some(upload_key),
            _ => None,
        }
    }
}

/// ErrorBody
///
/// JSON shape of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    pub message: String,
}

/// OrphanedUpload
///
/// Response extension set by `AppError` when a blob must be deleted. Consumed by
/// `cleanup_orphaned_uploads`.
#[derive(Debug, Clone)]
pub struct OrphanedUpload(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.kind().status();

        if let AppError::Internal { message, cause } = innermost(&self) {
            tracing::error!(error = %cause, "{}", message);
        }

        let body = ErrorBody {
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();

        if let Some(key) = self.orphaned_upload() {
            response
                .extensions_mut()
                .insert(OrphanedUpload(key.to_string()));
        }
        response
    }
}

fn innermost(error: &AppError) -> &AppError {
    match error {
        AppError::WithOrphanedUpload { source, .. } => innermost(source),
        other => other,
    }
}

/// cleanup_orphaned_uploads
///
/// Middleware that deletes an uploaded image when the request failed before the
/// record referencing it was persisted. Deletion is best-effort: a storage failure
/// is logged and the original error response is returned untouched.
pub async fn cleanup_orphaned_uploads(
    State(storage): State<StorageState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;

    if let Some(OrphanedUpload(key)) = response.extensions().get::<OrphanedUpload>() {
        match storage.delete_object(key).await {
            Ok(()) => tracing::debug!(key = %key, "removed orphaned upload"),
            Err(e) => tracing::warn!(key = %key, error = %e, "failed to remove orphaned upload"),
        }
    }

    response
}

// --- Conversions from layer errors ---

impl From<RepositoryError> for AppError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::Conflict(what) => AppError::Conflict(what),
            RepositoryError::Database(e) => {
                AppError::internal("Something went wrong, please try again later.", e)
            }
            RepositoryError::Backend(e) => {
                AppError::internal("Something went wrong, please try again later.", e)
            }
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(error: PasswordError) -> Self {
        AppError::internal("Could not process credentials, please try again.", error)
    }
}

impl From<StorageError> for AppError {
    fn from(error: StorageError) -> Self {
        AppError::internal("Could not store the uploaded image, please try again.", error)
    }
}

impl From<GeocodeError> for AppError {
    fn from(error: GeocodeError) -> Self {
        match error {
            GeocodeError::Unresolvable(_) => AppError::Validation(
                "Could not find location for the specified address.".to_string(),
            ),
            GeocodeError::Unavailable(_) => {
                AppError::internal("Could not resolve the address, please try again later.", error)
            }
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(error: axum::extract::multipart::MultipartError) -> Self {
        tracing::debug!(error = %error, "rejected multipart body");
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::invalid_input()
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        tracing::debug!(errors = %errors, "request failed validation");
        AppError::invalid_input()
    }
}
