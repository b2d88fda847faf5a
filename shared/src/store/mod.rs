pub mod dynamo;
pub mod memory;
pub mod postgres;

use crate::error::{StoreError, StoreResult};
use crate::types::{
    Achievement, AchievementInput, AchievementMirror, MirrorSync, NewUser, User, UserChanges,
    UserQuery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Primary (document) store for achievements.
///
/// The `*_draft` operations are single match-and-mutate calls keyed on
/// `{id, owner, status = draft}`; they return `false` when nothing matched.
#[async_trait]
pub trait AchievementStore: Send + Sync {
    /// Newest first.
    async fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Achievement>>;
    async fn get(&self, id: &str) -> StoreResult<Option<Achievement>>;
    async fn insert(&self, achievement: &Achievement) -> StoreResult<()>;
    async fn update_draft(
        &self,
        id: &str,
        owner_id: &str,
        input: &AchievementInput,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<bool>;
    async fn delete_draft(&self, id: &str, owner_id: &str) -> StoreResult<bool>;
    async fn submit_draft(&self, id: &str, owner_id: &str, at: DateTime<Utc>)
        -> StoreResult<bool>;
}

/// Relational mirror rows. Best-effort from the workflow's point of view.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    async fn insert_mirror(&self, mirror: &AchievementMirror) -> StoreResult<()>;
    /// Returns the number of rows touched.
    async fn sync_mirror(&self, sync: &MirrorSync) -> StoreResult<u64>;
    async fn delete_mirror(&self, primary_ref: &str) -> StoreResult<u64>;
}

/// Users joined with their role, plus the read-only role catalog.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// One page of users and the total number of matches.
    async fn list(&self, query: &UserQuery) -> StoreResult<(Vec<User>, u64)>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn insert(&self, user: &NewUser) -> StoreResult<Uuid>;
    async fn update(&self, id: Uuid, changes: &UserChanges) -> StoreResult<bool>;
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
    async fn role_exists(&self, role_id: Uuid) -> StoreResult<bool>;
    async fn set_role(&self, user_id: Uuid, role_id: Uuid) -> StoreResult<bool>;
}

/// Runs one store call under the per-operation deadline.
pub async fn bounded<T, F>(limit: Duration, op: &'static str, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("Store operation {} exceeded {:?}", op, limit);
            Err(StoreError::Timeout {
                op,
                millis: limit.as_millis(),
            })
        }
    }
}
