//! Durable user store.
//!
//! Authoritative for user records. The session core only reads through
//! [`UserRepository::get_user_by_id`] after a user snapshot cache miss;
//! sign-up, sign-in and user management use the rest.

use crate::errors::SessionError;
use crate::models::{Role, User, UserChanges, UserFilter};
use crate::observability::metrics::record_db_query;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

const EMAIL_UNIQUE_CONSTRAINT: &str = "users_email_unique";

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// `Ok(None)` when no user has this id.
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, SessionError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, SessionError>;

    /// Persist a new user. A duplicate email is a `Conflict`.
    async fn create_user(&self, user: &User) -> Result<(), SessionError>;

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, SessionError>;

    /// Apply `changes` and stamp `updated_at`. `Ok(None)` when no user has
    /// this id; a duplicate email is a `Conflict`.
    async fn update_user(
        &self,
        id: Uuid,
        changes: &UserChanges,
    ) -> Result<Option<User>, SessionError>;

    /// `Ok(false)` when no user has this id.
    async fn delete_user(&self, id: Uuid) -> Result<bool, SessionError>;
}

/// Row shape of the `users` table.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    surname: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = SessionError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = Role::from_str(&row.role)
            .map_err(|e| SessionError::Database(format!("Invalid role for user {}: {e}", row.id)))?;
        Ok(User {
            id: row.id,
            name: row.name,
            surname: row.surname,
            email: row.email,
            password_hash: row.password_hash,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn observe<T>(operation: &str, start: Instant, result: &Result<T, sqlx::Error>) {
    let status = if result.is_ok() { "success" } else { "error" };
    record_db_query(operation, status, start.elapsed());
}

fn is_duplicate_email(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.constraint())
        .is_some_and(|constraint| constraint == EMAIL_UNIQUE_CONSTRAINT)
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip_all, fields(user_id = %id))]
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, SessionError> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, surname, email, password_hash, role, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        observe("get_user_by_id", start, &result);

        result
            .map_err(|e| SessionError::Database(format!("Failed to fetch user by id: {e}")))?
            .map(User::try_from)
            .transpose()
    }

    #[instrument(skip_all)]
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, SessionError> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, surname, email, password_hash, role, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await;
        observe("get_user_by_email", start, &result);

        result
            .map_err(|e| SessionError::Database(format!("Failed to fetch user by email: {e}")))?
            .map(User::try_from)
            .transpose()
    }

    #[instrument(skip_all, fields(user_id = %user.id))]
    async fn create_user(&self, user: &User) -> Result<(), SessionError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, name, surname, email, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.surname)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await;
        observe("create_user", start, &result);

        match result {
            Ok(_) => {
                tracing::info!(target: "session.users", user_id = %user.id, "User created");
                Ok(())
            }
            Err(e) if is_duplicate_email(&e) => Err(SessionError::Conflict(
                "A user with this email already exists".to_string(),
            )),
            Err(e) => Err(SessionError::Database(format!("Failed to create user: {e}"))),
        }
    }

    #[instrument(skip_all, fields(limit = filter.limit, offset = filter.offset))]
    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, SessionError> {
        // ORDER BY cannot be bound; both parts come from fixed enum strings.
        let sql = format!(
            r#"
            SELECT id, name, surname, email, password_hash, role, created_at, updated_at
            FROM users
            WHERE ($1::TEXT IS NULL OR role = $1)
            ORDER BY {column} {direction}, id {direction}
            LIMIT $2 OFFSET $3
            "#,
            column = filter.order.as_column(),
            direction = filter.sort.as_sql(),
        );

        let start = Instant::now();
        let result = sqlx::query_as::<_, UserRow>(&sql)
            .bind(filter.role.map(|role| role.as_str()))
            .bind(i64::from(filter.limit))
            .bind(i64::from(filter.offset))
            .fetch_all(&self.pool)
            .await;
        observe("list_users", start, &result);

        result
            .map_err(|e| SessionError::Database(format!("Failed to list users: {e}")))?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    #[instrument(skip_all, fields(user_id = %id))]
    async fn update_user(
        &self,
        id: Uuid,
        changes: &UserChanges,
    ) -> Result<Option<User>, SessionError> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                surname = COALESCE($3, surname),
                email = COALESCE($4, email),
                password_hash = COALESCE($5, password_hash),
                role = COALESCE($6, role),
                updated_at = $7
            WHERE id = $1
            RETURNING id, name, surname, email, password_hash, role, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.surname.as_deref())
        .bind(changes.email.as_deref())
        .bind(changes.password_hash.as_deref())
        .bind(changes.role.map(|role| role.as_str()))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await;
        observe("update_user", start, &result);

        match result {
            Ok(row) => row.map(User::try_from).transpose(),
            Err(e) if is_duplicate_email(&e) => Err(SessionError::Conflict(
                "A user with this email already exists".to_string(),
            )),
            Err(e) => Err(SessionError::Database(format!("Failed to update user: {e}"))),
        }
    }

    #[instrument(skip_all, fields(user_id = %id))]
    async fn delete_user(&self, id: Uuid) -> Result<bool, SessionError> {
        let start = Instant::now();
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await;
        observe("delete_user", start, &result);

        let deleted = result
            .map_err(|e| SessionError::Database(format!("Failed to delete user: {e}")))?
            .rows_affected()
            > 0;
        if deleted {
            tracing::info!(target: "session.users", user_id = %id, "User deleted");
        }
        Ok(deleted)
    }
}
