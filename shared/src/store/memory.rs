//! In-process store backends.
//!
//! Each store keeps its data behind a single mutex, so every trait call, including the
//! conditional writes, is atomic with respect to every other call on the same store.

use super::{AchievementStore, MirrorStore, UserStore};
use crate::error::{StoreError, StoreResult};
use crate::types::{
    Achievement, AchievementInput, AchievementMirror, AchievementStatus, MirrorSync, NewUser,
    Role, SortColumn, SortOrder, User, UserChanges, UserQuery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
}

// ========== ACHIEVEMENTS ==========
#[derive(Default)]
pub struct MemoryAchievementStore {
    records: Mutex<HashMap<String, Achievement>>,
}

impl MemoryAchievementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AchievementStore for MemoryAchievementStore {
    async fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Achievement>> {
        let records = lock(&self.records)?;
        let mut owned: Vec<Achievement> = records
            .values()
            .filter(|a| a.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(owned)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Achievement>> {
        Ok(lock(&self.records)?.get(id).cloned())
    }

    async fn insert(&self, achievement: &Achievement) -> StoreResult<()> {
        let mut records = lock(&self.records)?;
        if records.contains_key(&achievement.id) {
            return Err(StoreError::Conflict(format!(
                "achievement {} already exists",
                achievement.id
            )));
        }
        records.insert(achievement.id.clone(), achievement.clone());
        Ok(())
    }

    async fn update_draft(
        &self,
        id: &str,
        owner_id: &str,
        input: &AchievementInput,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut records = lock(&self.records)?;
        match records.get_mut(id) {
            Some(a) if a.owner_id == owner_id && a.status == AchievementStatus::Draft => {
                a.title = input.title.clone();
                a.description = input.description.clone();
                a.document_ref = input.document_ref.clone();
                a.updated_at = updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_draft(&self, id: &str, owner_id: &str) -> StoreResult<bool> {
        let mut records = lock(&self.records)?;
        let matches = records
            .get(id)
            .map(|a| a.owner_id == owner_id && a.status == AchievementStatus::Draft)
            .unwrap_or(false);
        if matches {
            records.remove(id);
        }
        Ok(matches)
    }

    async fn submit_draft(
        &self,
        id: &str,
        owner_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut records = lock(&self.records)?;
        match records.get_mut(id) {
            Some(a) if a.owner_id == owner_id && a.status == AchievementStatus::Draft => {
                a.status = AchievementStatus::Submitted;
                a.submit_date = Some(at);
                a.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ========== RELATIONAL ==========
#[derive(Default)]
struct Tables {
    roles: HashMap<Uuid, Role>,
    users: HashMap<Uuid, User>,
    mirrors: HashMap<Uuid, AchievementMirror>,
}

/// Users, roles and mirror rows, with the same uniqueness and reference rules as the
/// relational schema.
#[derive(Default)]
pub struct MemoryRelationalStore {
    tables: Mutex<Tables>,
}

impl MemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the role catalog, which this crate never writes otherwise.
    pub fn add_role(&self, name: &str, description: &str) -> Role {
        let role = Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
        };
        if let Ok(mut tables) = self.tables.lock() {
            tables.roles.insert(role.id, role.clone());
        }
        role
    }

    pub fn mirror_for(&self, primary_ref: &str) -> Option<AchievementMirror> {
        self.tables
            .lock()
            .ok()?
            .mirrors
            .values()
            .find(|m| m.primary_ref == primary_ref)
            .cloned()
    }

    pub fn user_count(&self) -> usize {
        self.tables.lock().map(|t| t.users.len()).unwrap_or(0)
    }
}

fn with_role(tables: &Tables, user: &User) -> User {
    let mut user = user.clone();
    user.role = tables.roles.get(&user.role_id).cloned();
    user
}

fn compare(a: &User, b: &User, column: SortColumn) -> Ordering {
    match column {
        SortColumn::Id => a.id.cmp(&b.id),
        SortColumn::Username => a.username.cmp(&b.username),
        SortColumn::Email => a.email.cmp(&b.email),
        SortColumn::FullName => a.full_name.cmp(&b.full_name),
        SortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
    }
}

#[async_trait]
impl UserStore for MemoryRelationalStore {
    async fn list(&self, query: &UserQuery) -> StoreResult<(Vec<User>, u64)> {
        let tables = lock(&self.tables)?;
        let needle = query.search.to_lowercase();
        let mut matches: Vec<&User> = tables
            .users
            .values()
            .filter(|u| {
                needle.is_empty()
                    || u.username.to_lowercase().contains(&needle)
                    || u.email.to_lowercase().contains(&needle)
                    || u.full_name.to_lowercase().contains(&needle)
            })
            .collect();

        matches.sort_by(|a, b| {
            let ord = compare(a, b, query.sort_by).then(a.id.cmp(&b.id));
            match query.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = matches.len() as u64;
        let items = matches
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .map(|u| with_role(&tables, u))
            .collect();
        Ok((items, total))
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<User>> {
        let tables = lock(&self.tables)?;
        Ok(tables.users.get(&id).map(|u| with_role(&tables, u)))
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let tables = lock(&self.tables)?;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .map(|u| with_role(&tables, u)))
    }

    async fn insert(&self, new: &NewUser) -> StoreResult<Uuid> {
        let mut tables = lock(&self.tables)?;
        if tables.users.values().any(|u| u.username == new.username) {
            return Err(StoreError::Conflict("username already exists".to_string()));
        }
        if !tables.roles.contains_key(&new.role_id) {
            return Err(StoreError::MissingReference("role not found".to_string()));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new.username.clone(),
            email: new.email.clone(),
            password_digest: new.password_digest.clone(),
            full_name: new.full_name.clone(),
            is_active: true,
            role_id: new.role_id,
            role: None,
            created_at: now,
            updated_at: now,
        };
        let id = user.id;
        tables.users.insert(id, user);
        Ok(id)
    }

    async fn update(&self, id: Uuid, changes: &UserChanges) -> StoreResult<bool> {
        let mut tables = lock(&self.tables)?;
        if tables
            .users
            .values()
            .any(|u| u.id != id && u.username == changes.username)
        {
            return Err(StoreError::Conflict("username already exists".to_string()));
        }
        match tables.users.get_mut(&id) {
            Some(user) => {
                user.username = changes.username.clone();
                user.email = changes.email.clone();
                user.full_name = changes.full_name.clone();
                user.is_active = changes.is_active;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        Ok(lock(&self.tables)?.users.remove(&id).is_some())
    }

    async fn role_exists(&self, role_id: Uuid) -> StoreResult<bool> {
        Ok(lock(&self.tables)?.roles.contains_key(&role_id))
    }

    async fn set_role(&self, user_id: Uuid, role_id: Uuid) -> StoreResult<bool> {
        let mut tables = lock(&self.tables)?;
        if !tables.roles.contains_key(&role_id) {
            return Err(StoreError::MissingReference("role not found".to_string()));
        }
        match tables.users.get_mut(&user_id) {
            Some(user) => {
                user.role_id = role_id;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl MirrorStore for MemoryRelationalStore {
    async fn insert_mirror(&self, mirror: &AchievementMirror) -> StoreResult<()> {
        let mut tables = lock(&self.tables)?;
        tables.mirrors.insert(mirror.id, mirror.clone());
        Ok(())
    }

    async fn sync_mirror(&self, sync: &MirrorSync) -> StoreResult<u64> {
        let mut tables = lock(&self.tables)?;
        let mut touched = 0;
        for mirror in tables
            .mirrors
            .values_mut()
            .filter(|m| m.primary_ref == sync.primary_ref)
        {
            mirror.title = sync.title.clone();
            mirror.status = sync.status;
            mirror.submit_date = sync.submit_date;
            if let Some(notes) = &sync.notes {
                mirror.notes = notes.clone();
            }
            mirror.updated_at = sync.updated_at;
            touched += 1;
        }
        Ok(touched)
    }

    async fn delete_mirror(&self, primary_ref: &str) -> StoreResult<u64> {
        let mut tables = lock(&self.tables)?;
        let before = tables.mirrors.len();
        tables.mirrors.retain(|_, m| m.primary_ref != primary_ref);
        Ok((before - tables.mirrors.len()) as u64)
    }
}
