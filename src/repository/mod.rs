//! Persistence layer for users and places.
//!
//! Users and places are separate aggregates linked by id in both directions:
//! `Place::creator_id` points at the owner and `User::place_ids` lists every
//! place the user created. The two sides are only ever changed together, inside
//! the single transactions behind `insert_place_for_owner` and
//! `delete_place_for_owner`.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Place, User};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// RepositoryError
///
/// Failures a store can report. `NotFound` and `Conflict` carry the
/// client-facing message; the rest are internal.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

pub const DUPLICATE_EMAIL_MESSAGE: &str = "User exists already, please login instead.";
pub const PLACE_NOT_FOUND_MESSAGE: &str = "Could not find place for the provided id.";
pub const OWNER_NOT_FOUND_MESSAGE: &str = "Could not find user for the provided id.";

/// Repository Trait
///
/// The contract every store implements. `Send + Sync + async_trait` make the
/// trait object shareable across axum's request tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    /// Every user, oldest first.
    async fn list_users(&self) -> RepositoryResult<Vec<User>>;
    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>>;
    /// Looks a user up by an already normalized email.
    async fn find_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;
    /// Inserts a new user. A taken email is a `Conflict`.
    async fn create_user(&self, user: User) -> RepositoryResult<User>;

    // --- Places ---
    async fn get_place(&self, id: Uuid) -> RepositoryResult<Option<Place>>;
    /// Every place created by `user_id`, oldest first.
    async fn get_places_by_creator(&self, user_id: Uuid) -> RepositoryResult<Vec<Place>>;
    /// Rewrites title and description. Returns `None` if the place does not exist.
    async fn update_place_details(
        &self,
        id: Uuid,
        title: &str,
        description: &str,
    ) -> RepositoryResult<Option<Place>>;

    // --- Relationship-changing units (one transaction each) ---
    /// Inserts `place` and adds its id to the creator's `place_ids`, atomically.
    /// Fails with `NotFound` if the creator does not exist.
    async fn insert_place_for_owner(&self, place: Place) -> RepositoryResult<Place>;

    /// Deletes the place and removes its id from the owner's `place_ids`,
    /// atomically. Fails with `NotFound` if the place does not exist or is not
    /// owned by `owner_id`.
    async fn delete_place_for_owner(&self, place_id: Uuid, owner_id: Uuid) -> RepositoryResult<()>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
