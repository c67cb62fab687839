use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use super::{
    DUPLICATE_EMAIL_MESSAGE, OWNER_NOT_FOUND_MESSAGE, PLACE_NOT_FOUND_MESSAGE, Repository,
    RepositoryError, RepositoryResult,
};
use crate::models::{Place, User};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    places: HashMap<Uuid, Place>,
}

/// InMemoryRepository
///
/// `Repository` kept in process memory, with the same transactional guarantees
/// as the Postgres store: a unit of work is applied to a staged copy of the
/// tables under the write lock and only published if every step succeeds. The
/// lock is never held across an await.
///
/// Failure injection hooks make the second write of a relationship unit fail,
/// which is how atomicity is exercised in tests.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
    fail_owner_attach: AtomicBool,
    fail_owner_detach: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `insert_place_for_owner` fail after its place insert.
    pub fn fail_next_owner_attach(&self) {
        self.fail_owner_attach.store(true, Ordering::SeqCst);
    }

    /// Makes the next `delete_place_for_owner` fail after its place delete.
    pub fn fail_next_owner_detach(&self) {
        self.fail_owner_detach.store(true, Ordering::SeqCst);
    }

    fn read<T>(&self, query: impl FnOnce(&Tables) -> T) -> RepositoryResult<T> {
        let tables = self
            .tables
            .read()
            .map_err(|_| RepositoryError::Backend("in-memory store lock poisoned".to_string()))?;
        Ok(query(&tables))
    }

    /// transaction
    ///
    /// Runs `work` against a copy of the tables and swaps it in on success.
    fn transaction<T>(
        &self,
        work: impl FnOnce(&mut Tables) -> RepositoryResult<T>,
    ) -> RepositoryResult<T> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| RepositoryError::Backend("in-memory store lock poisoned".to_string()))?;

        let mut staged = tables.clone();
        let outcome = work(&mut staged)?;
        *tables = staged;
        Ok(outcome)
    }
}

/// Orders rows oldest first, ties broken by id, matching the SQL `ORDER BY`.
fn sorted<T>(mut rows: Vec<T>, key: impl Fn(&T) -> (DateTime<Utc>, Uuid)) -> Vec<T> {
    rows.sort_by_key(key);
    rows
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn list_users(&self) -> RepositoryResult<Vec<User>> {
        let users = self.read(|t| t.users.values().cloned().collect::<Vec<_>>())?;
        Ok(sorted(users, |u| (u.created_at, u.id)))
    }

    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        self.read(|t| t.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        self.read(|t| t.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: User) -> RepositoryResult<User> {
        self.transaction(|t| {
            if t.users.values().any(|u| u.email == user.email) {
                return Err(RepositoryError::Conflict(DUPLICATE_EMAIL_MESSAGE.to_string()));
            }
            t.users.insert(user.id, user.clone());
            Ok(user)
        })
    }

    async fn get_place(&self, id: Uuid) -> RepositoryResult<Option<Place>> {
        self.read(|t| t.places.get(&id).cloned())
    }

    async fn get_places_by_creator(&self, user_id: Uuid) -> RepositoryResult<Vec<Place>> {
        let places = self.read(|t| {
            t.places
                .values()
                .filter(|p| p.creator_id == user_id)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(sorted(places, |p| (p.created_at, p.id)))
    }

    async fn update_place_details(
        &self,
        id: Uuid,
        title: &str,
        description: &str,
    ) -> RepositoryResult<Option<Place>> {
        self.transaction(|t| {
            Ok(t.places.get_mut(&id).map(|place| {
                place.title = title.to_string();
                place.description = description.to_string();
                place.clone()
            }))
        })
    }

    async fn insert_place_for_owner(&self, place: Place) -> RepositoryResult<Place> {
        self.transaction(|t| {
            if !t.users.contains_key(&place.creator_id) {
                return Err(RepositoryError::NotFound(OWNER_NOT_FOUND_MESSAGE.to_string()));
            }
            if t.places.contains_key(&place.id) {
                return Err(RepositoryError::Conflict(
                    "A place with this id already exists.".to_string(),
                ));
            }
            t.places.insert(place.id, place.clone());

            if self.fail_owner_attach.swap(false, Ordering::SeqCst) {
                return Err(RepositoryError::Backend(
                    "injected failure while attaching place to owner".to_string(),
                ));
            }

            let owner = t
                .users
                .get_mut(&place.creator_id)
                .ok_or_else(|| RepositoryError::NotFound(OWNER_NOT_FOUND_MESSAGE.to_string()))?;
            if !owner.place_ids.contains(&place.id) {
                owner.place_ids.push(place.id);
            }
            Ok(place)
        })
    }

    async fn delete_place_for_owner(&self, place_id: Uuid, owner_id: Uuid) -> RepositoryResult<()> {
        self.transaction(|t| {
            match t.places.get(&place_id) {
                Some(place) if place.is_owned_by(owner_id) => {}
                _ => return Err(RepositoryError::NotFound(PLACE_NOT_FOUND_MESSAGE.to_string())),
            }
            t.places.remove(&place_id);

            if self.fail_owner_detach.swap(false, Ordering::SeqCst) {
                return Err(RepositoryError::Backend(
                    "injected failure while detaching place from owner".to_string(),
                ));
            }

            let owner = t
                .users
                .get_mut(&owner_id)
                .ok_or_else(|| RepositoryError::NotFound(OWNER_NOT_FOUND_MESSAGE.to_string()))?;
            owner.place_ids.retain(|id| *id != place_id);
            Ok(())
        })
    }
}
