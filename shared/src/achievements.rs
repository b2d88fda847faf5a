//! Achievement lifecycle: `draft --submit--> submitted`, owner-only mutation while in draft.
//!
//! The primary store is the system of record and is always written first. The relational
//! mirror is written afterwards and only on a best-effort basis: a failed mirror write is
//! logged and never undoes or fails the primary write. `reconcile_mirror` repairs drift.

use crate::error::{ServiceError, ServiceResult, StoreResult};
use crate::store::{bounded, AchievementStore, MirrorStore};
use crate::types::{
    Achievement, AchievementInput, AchievementMirror, AchievementStatus, MirrorSync,
    ReconcileOutcome,
};
use crate::validation::{is_object_id, new_object_id, parse_row_id, validate_achievement};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const NOT_FOUND: &str = "achievement not found";

#[derive(Clone)]
pub struct AchievementWorkflow {
    records: Arc<dyn AchievementStore>,
    mirror: Arc<dyn MirrorStore>,
    timeout: Duration,
}

impl AchievementWorkflow {
    pub fn new(
        records: Arc<dyn AchievementStore>,
        mirror: Arc<dyn MirrorStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            records,
            mirror,
            timeout,
        }
    }

    /// All achievements owned by `owner_id`, newest first. Empty when there are none.
    pub async fn list_by_owner(&self, owner_id: &str) -> ServiceResult<Vec<Achievement>> {
        let achievements = bounded(
            self.timeout,
            "achievements.list_by_owner",
            self.records.list_by_owner(owner_id),
        )
        .await?;
        Ok(achievements)
    }

    pub async fn get_by_id(&self, id: &str) -> ServiceResult<Achievement> {
        if !is_object_id(id) {
            return Err(ServiceError::not_found(NOT_FOUND));
        }
        bounded(self.timeout, "achievements.get", self.records.get(id))
            .await?
            .ok_or_else(|| ServiceError::not_found(NOT_FOUND))
    }

    /// Detail read for a caller: the record must exist and belong to them.
    pub async fn get_for_owner(&self, id: &str, owner_id: &str) -> ServiceResult<Achievement> {
        let achievement = self.get_by_id(id).await?;
        if achievement.owner_id != owner_id {
            return Err(ServiceError::Forbidden(
                "achievement belongs to another user".to_string(),
            ));
        }
        Ok(achievement)
    }

    pub async fn create(
        &self,
        owner_id: &str,
        input: AchievementInput,
    ) -> ServiceResult<Achievement> {
        validate_achievement(&input)?;

        let now = Utc::now();
        let achievement = Achievement {
            id: new_object_id(),
            owner_id: owner_id.to_string(),
            title: input.title,
            description: input.description,
            document_ref: input.document_ref,
            status: AchievementStatus::Draft,
            submit_date: None,
            created_at: now,
            updated_at: now,
        };

        bounded(
            self.timeout,
            "achievements.insert",
            self.records.insert(&achievement),
        )
        .await?;
        tracing::info!("Created achievement {} for {}", achievement.id, owner_id);

        match parse_row_id(owner_id) {
            Some(owner_uuid) => {
                let mirror = new_mirror(&achievement, owner_uuid);
                self.mirror_best_effort(
                    &achievement.id,
                    "mirror.insert",
                    self.mirror.insert_mirror(&mirror),
                )
                .await;
            }
            None => tracing::warn!(
                "Skipping mirror row for achievement {}: owner {:?} is not a UUID",
                achievement.id,
                owner_id
            ),
        }

        Ok(achievement)
    }

    pub async fn update(
        &self,
        id: &str,
        owner_id: &str,
        input: AchievementInput,
    ) -> ServiceResult<Achievement> {
        let current = self.load_owned(id, owner_id).await?;
        ensure_draft(&current, "updated")?;
        validate_achievement(&input)?;

        let now = Utc::now();
        let applied = bounded(
            self.timeout,
            "achievements.update_draft",
            self.records.update_draft(id, owner_id, &input, now),
        )
        .await?;
        if !applied {
            return Err(lost_race(id, "updated"));
        }
        tracing::info!("Updated achievement {}", id);

        let updated = self.get_by_id(id).await?;
        let sync = MirrorSync {
            primary_ref: updated.id.clone(),
            title: updated.title.clone(),
            status: updated.status,
            submit_date: updated.submit_date,
            notes: None,
            updated_at: updated.updated_at,
        };
        self.mirror_best_effort(id, "mirror.sync", async {
            self.mirror.sync_mirror(&sync).await.map(|_| ())
        })
        .await;

        Ok(updated)
    }

    pub async fn delete(&self, id: &str, owner_id: &str) -> ServiceResult<()> {
        let current = self.load_owned(id, owner_id).await?;
        ensure_draft(&current, "deleted")?;

        let deleted = bounded(
            self.timeout,
            "achievements.delete_draft",
            self.records.delete_draft(id, owner_id),
        )
        .await?;
        if !deleted {
            return Err(lost_race(id, "deleted"));
        }
        tracing::info!("Deleted achievement {}", id);

        self.mirror_best_effort(id, "mirror.delete", async {
            self.mirror.delete_mirror(id).await.map(|_| ())
        })
        .await;
        Ok(())
    }

    /// Moves a draft to `submitted`. Of two concurrent submits exactly one matches the
    /// conditional write; the other gets `InvalidState`.
    pub async fn submit(&self, id: &str, owner_id: &str, notes: &str) -> ServiceResult<Achievement> {
        self.load_owned(id, owner_id).await?;

        let now = Utc::now();
        let submitted = bounded(
            self.timeout,
            "achievements.submit_draft",
            self.records.submit_draft(id, owner_id, now),
        )
        .await?;
        if !submitted {
            return Err(ServiceError::InvalidState(
                "only draft achievements can be submitted".to_string(),
            ));
        }
        tracing::info!("Submitted achievement {}", id);

        let achievement = self.get_by_id(id).await?;
        let sync = MirrorSync {
            primary_ref: achievement.id.clone(),
            title: achievement.title.clone(),
            status: AchievementStatus::Submitted,
            submit_date: achievement.submit_date,
            notes: Some(notes.to_string()),
            updated_at: now,
        };
        self.mirror_best_effort(id, "mirror.sync", async {
            self.mirror.sync_mirror(&sync).await.map(|_| ())
        })
        .await;

        Ok(achievement)
    }

    /// Re-derives the mirror row from the primary record. Unlike the workflow operations,
    /// mirror failures are returned to the caller here.
    pub async fn reconcile_mirror(&self, id: &str) -> ServiceResult<ReconcileOutcome> {
        if !is_object_id(id) {
            return Err(ServiceError::not_found(NOT_FOUND));
        }

        let primary = bounded(self.timeout, "achievements.get", self.records.get(id)).await?;
        let Some(achievement) = primary else {
            let removed =
                bounded(self.timeout, "mirror.delete", self.mirror.delete_mirror(id)).await?;
            return Ok(if removed > 0 {
                ReconcileOutcome::Removed
            } else {
                ReconcileOutcome::Unchanged
            });
        };

        let sync = MirrorSync {
            primary_ref: achievement.id.clone(),
            title: achievement.title.clone(),
            status: achievement.status,
            submit_date: achievement.submit_date,
            notes: None,
            updated_at: achievement.updated_at,
        };
        let touched = bounded(self.timeout, "mirror.sync", self.mirror.sync_mirror(&sync)).await?;
        if touched > 0 {
            return Ok(ReconcileOutcome::Updated);
        }

        let owner = parse_row_id(&achievement.owner_id).ok_or_else(|| {
            ServiceError::validation("achievement owner is not a relational user id")
        })?;
        let mirror = new_mirror(&achievement, owner);
        bounded(self.timeout, "mirror.insert", self.mirror.insert_mirror(&mirror)).await?;
        tracing::info!("Recreated missing mirror row for achievement {}", id);
        Ok(ReconcileOutcome::Inserted)
    }

    async fn load_owned(&self, id: &str, owner_id: &str) -> ServiceResult<Achievement> {
        self.get_for_owner(id, owner_id).await
    }

    async fn mirror_best_effort<F>(&self, id: &str, op: &'static str, write: F)
    where
        F: Future<Output = StoreResult<()>>,
    {
        if let Err(e) = bounded(self.timeout, op, write).await {
            tracing::warn!("Mirror write {} for achievement {} failed: {}", op, id, e);
        }
    }
}

fn new_mirror(achievement: &Achievement, owner_id: Uuid) -> AchievementMirror {
    AchievementMirror {
        id: Uuid::new_v4(),
        owner_id,
        primary_ref: achievement.id.clone(),
        title: achievement.title.clone(),
        status: achievement.status,
        submit_date: achievement.submit_date,
        notes: String::new(),
        verified_by: None,
        created_at: achievement.created_at,
        updated_at: achievement.updated_at,
    }
}

fn ensure_draft(achievement: &Achievement, action: &str) -> ServiceResult<()> {
    if achievement.status != AchievementStatus::Draft {
        return Err(ServiceError::InvalidState(format!(
            "only draft achievements can be {}",
            action
        )));
    }
    Ok(())
}

/// The record left draft between our read and the conditional write.
fn lost_race(id: &str, action: &str) -> ServiceError {
    tracing::info!("Achievement {} changed state before it could be {}", id, action);
    ServiceError::InvalidState(format!("only draft achievements can be {}", action))
}
