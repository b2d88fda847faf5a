//! PostgreSQL relational store: users, the role catalog and achievement mirror rows.
//!
//! Queries are bound at runtime. The only text spliced into SQL is the ORDER BY clause,
//! which comes from the closed `SortColumn`/`SortOrder` enums.

use super::{MirrorStore, UserStore};
use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::types::{
    AchievementMirror, MirrorSync, NewUser, Role, User, UserChanges, UserQuery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use uuid::Uuid;

const USER_COLUMNS: &str = r#"
    SELECT u.id, u.username, u.email, u.password_hash, u.full_name,
           u.is_active, u.role_id, u.created_at, u.updated_at,
           r.name AS role_name, r.description AS role_description
    FROM users u
    LEFT JOIN roles r ON u.role_id = r.id
"#;

const SEARCH_FILTER: &str = r#"
    WHERE ($1 = '' OR u.username ILIKE $2 OR u.email ILIKE $2 OR u.full_name ILIKE $2)
"#;

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    full_name: String,
    is_active: bool,
    role_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    role_name: Option<String>,
    role_description: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let role = row.role_name.map(|name| Role {
            id: row.role_id,
            name,
            description: row.role_description.unwrap_or_default(),
        });
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_digest: row.password_hash,
            full_name: row.full_name,
            is_active: row.is_active,
            role_id: row.role_id,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    acquire_timeout: Duration,
}

impl PgStore {
    pub async fn connect(config: &Config) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(config.store_timeout)
            .connect(&config.database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to connect postgres: {}", e)))?;
        tracing::info!("Connected to PostgreSQL (pool size {})", config.db_max_connections);
        Ok(Self {
            pool,
            acquire_timeout: config.store_timeout,
        })
    }
}

fn map_sqlx(op: &'static str, acquire_timeout: Duration, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.constraint().unwrap_or("unique").to_string())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            StoreError::MissingReference(db.constraint().unwrap_or("foreign key").to_string())
        }
        sqlx::Error::PoolTimedOut => {
            tracing::error!("PostgreSQL {}: no pooled connection within {:?}", op, acquire_timeout);
            StoreError::Timeout {
                op,
                millis: acquire_timeout.as_millis(),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Malformed(format!("{}: {}", op, err))
        }
        _ => {
            tracing::error!("PostgreSQL {} failed: {}", op, err);
            StoreError::Unavailable(format!("{}: {}", op, err))
        }
    }
}

/// `%term%` with LIKE metacharacters escaped.
fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl UserStore for PgStore {
    async fn list(&self, query: &UserQuery) -> StoreResult<(Vec<User>, u64)> {
        let pattern = like_pattern(&query.search);

        let sql = format!(
            "{} {} ORDER BY {} {}, u.id ASC LIMIT $3 OFFSET $4",
            USER_COLUMNS,
            SEARCH_FILTER,
            query.sort_by.as_sql(),
            query.order.as_sql()
        );
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .bind(&query.search)
            .bind(&pattern)
            .bind(query.limit as i64)
            .bind(query.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx("users.list", self.acquire_timeout, e))?;

        let count_sql = format!("SELECT COUNT(*) FROM users u {}", SEARCH_FILTER);
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(&query.search)
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx("users.count", self.acquire_timeout, e))?;

        Ok((rows.into_iter().map(User::from).collect(), total.max(0) as u64))
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("{} WHERE u.id = $1", USER_COLUMNS);
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx("users.get", self.acquire_timeout, e))?;
        Ok(row.map(User::from))
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let sql = format!("{} WHERE u.username = $1", USER_COLUMNS);
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx("users.find_by_username", self.acquire_timeout, e))?;
        Ok(row.map(User::from))
    }

    async fn insert(&self, user: &NewUser) -> StoreResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO users (username, email, password_hash, full_name, role_id, is_active)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            RETURNING id
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_digest)
        .bind(&user.full_name)
        .bind(user.role_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx("users.insert", self.acquire_timeout, e))?;
        Ok(id)
    }

    async fn update(&self, id: Uuid, changes: &UserChanges) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET username = $1, email = $2, full_name = $3, is_active = $4, updated_at = NOW()
             WHERE id = $5
            "#,
        )
        .bind(&changes.username)
        .bind(&changes.email)
        .bind(&changes.full_name)
        .bind(changes.is_active)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx("users.update", self.acquire_timeout, e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx("users.delete", self.acquire_timeout, e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn role_exists(&self, role_id: Uuid) -> StoreResult<bool> {
        let found: Option<Uuid> = sqlx::query_scalar("SELECT id FROM roles WHERE id = $1")
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx("roles.exists", self.acquire_timeout, e))?;
        Ok(found.is_some())
    }

    async fn set_role(&self, user_id: Uuid, role_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE users SET role_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(role_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx("users.set_role", self.acquire_timeout, e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl MirrorStore for PgStore {
    async fn insert_mirror(&self, mirror: &AchievementMirror) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO achievements
                (id, user_id, mongo_id, title, status, submit_date, notes, verification_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(mirror.id)
        .bind(mirror.owner_id)
        .bind(&mirror.primary_ref)
        .bind(&mirror.title)
        .bind(mirror.status.as_str())
        .bind(mirror.submit_date)
        .bind(&mirror.notes)
        .bind(mirror.verified_by)
        .bind(mirror.created_at)
        .bind(mirror.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx("mirror.insert", self.acquire_timeout, e))?;
        Ok(())
    }

    async fn sync_mirror(&self, sync: &MirrorSync) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE achievements
               SET title = $1, status = $2, submit_date = $3,
                   notes = COALESCE($4, notes), updated_at = $5
             WHERE mongo_id = $6
            "#,
        )
        .bind(&sync.title)
        .bind(sync.status.as_str())
        .bind(sync.submit_date)
        .bind(sync.notes.as_deref())
        .bind(sync.updated_at)
        .bind(&sync.primary_ref)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx("mirror.sync", self.acquire_timeout, e))?;
        Ok(result.rows_affected())
    }

    async fn delete_mirror(&self, primary_ref: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM achievements WHERE mongo_id = $1")
            .bind(primary_ref)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx("mirror.delete", self.acquire_timeout, e))?;
        Ok(result.rows_affected())
    }
}
