use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    DUPLICATE_EMAIL_MESSAGE, OWNER_NOT_FOUND_MESSAGE, PLACE_NOT_FOUND_MESSAGE, Repository,
    RepositoryError, RepositoryResult,
};
use crate::models::{Place, User};

const USER_COLUMNS: &str =
    "id, name, email, password_hash, image_url, image_key, place_ids, created_at";
const PLACE_COLUMNS: &str =
    "id, title, description, address, lat, lng, image_url, image_key, creator_id, created_at";

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Relationship-changing operations run in a
/// transaction at the default READ COMMITTED isolation, so no reader ever sees
/// a place without its back-reference or the reverse.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Maps constraint violations on insert to the matching domain error.
fn map_insert_error(error: sqlx::Error, unique_message: &str) -> RepositoryError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_unique_violation() {
            return RepositoryError::Conflict(unique_message.to_string());
        }
        if db.is_foreign_key_violation() {
            return RepositoryError::NotFound(OWNER_NOT_FOUND_MESSAGE.to_string());
        }
    }
    RepositoryError::Database(error)
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn list_users(&self) -> RepositoryResult<Vec<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at, id");
        let users = sqlx::query_as::<_, User>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// create_user
    ///
    /// The unique index on `email` is the final word on duplicates, even if two
    /// signups race past the handler's lookup.
    async fn create_user(&self, user: User) -> RepositoryResult<User> {
        let query = format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.image_url)
            .bind(&user.image_key)
            .bind(&user.place_ids)
            .bind(user.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, DUPLICATE_EMAIL_MESSAGE))
    }

    async fn get_place(&self, id: Uuid) -> RepositoryResult<Option<Place>> {
        let query = format!("SELECT {PLACE_COLUMNS} FROM places WHERE id = $1");
        let place = sqlx::query_as::<_, Place>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(place)
    }

    async fn get_places_by_creator(&self, user_id: Uuid) -> RepositoryResult<Vec<Place>> {
        let query = format!(
            "SELECT {PLACE_COLUMNS} FROM places WHERE creator_id = $1 ORDER BY created_at, id"
        );
        let places = sqlx::query_as::<_, Place>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(places)
    }

    async fn update_place_details(
        &self,
        id: Uuid,
        title: &str,
        description: &str,
    ) -> RepositoryResult<Option<Place>> {
        let query = format!(
            "UPDATE places SET title = $2, description = $3 WHERE id = $1 RETURNING {PLACE_COLUMNS}"
        );
        let place = sqlx::query_as::<_, Place>(&query)
            .bind(id)
            .bind(title)
            .bind(description)
            .fetch_optional(&self.pool)
            .await?;
        Ok(place)
    }

    /// insert_place_for_owner
    ///
    /// Insert, then append to the owner's set, then commit. The append is done in
    /// SQL against the current row, so concurrent creations by the same user
    /// serialize on the row lock instead of overwriting each other's sets.
    /// Returning early on any error drops `tx`, which rolls both writes back.
    async fn insert_place_for_owner(&self, place: Place) -> RepositoryResult<Place> {
        let mut tx = self.pool.begin().await?;

        let insert = format!(
            "INSERT INTO places ({PLACE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {PLACE_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Place>(&insert)
            .bind(place.id)
            .bind(&place.title)
            .bind(&place.description)
            .bind(&place.address)
            .bind(place.lat)
            .bind(place.lng)
            .bind(&place.image_url)
            .bind(&place.image_key)
            .bind(place.creator_id)
            .bind(place.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_insert_error(e, "A place with this id already exists."))?;

        let attached = sqlx::query(
            r#"
            UPDATE users
            SET place_ids = CASE WHEN $1 = ANY(place_ids) THEN place_ids
                                 ELSE array_append(place_ids, $1) END
            WHERE id = $2
            "#,
        )
        .bind(created.id)
        .bind(created.creator_id)
        .execute(&mut *tx)
        .await?;

        if attached.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(OWNER_NOT_FOUND_MESSAGE.to_string()));
        }

        tx.commit().await?;
        Ok(created)
    }

    /// delete_place_for_owner
    ///
    /// Delete, then detach from the owner's set, then commit.
    async fn delete_place_for_owner(&self, place_id: Uuid, owner_id: Uuid) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM places WHERE id = $1 AND creator_id = $2")
            .bind(place_id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(PLACE_NOT_FOUND_MESSAGE.to_string()));
        }

        let detached =
            sqlx::query("UPDATE users SET place_ids = array_remove(place_ids, $1) WHERE id = $2")
                .bind(place_id)
                .bind(owner_id)
                .execute(&mut *tx)
                .await?;

        if detached.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(OWNER_NOT_FOUND_MESSAGE.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }
}
