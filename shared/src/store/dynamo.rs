use super::AchievementStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{Achievement, AchievementInput, AchievementStatus};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

type Item = HashMap<String, AttributeValue>;

/// Match on the owner and the draft status in the same call that mutates.
const OWNED_DRAFT: &str = "attribute_exists(PK) AND user_id = :owner AND #status = :draft";

/// Achievement documents in a single DynamoDB table.
///
/// Items are keyed `PK = SK = ACHIEVEMENT#<id>`; owner listings go through a global
/// secondary index on `user_id` with `created_at` as its sort key.
pub struct DynamoAchievementStore {
    client: DynamoClient,
    table_name: String,
    owner_index: String,
}

impl DynamoAchievementStore {
    pub fn new(client: DynamoClient, table_name: &str, owner_index: &str) -> Self {
        Self {
            client,
            table_name: table_name.to_string(),
            owner_index: owner_index.to_string(),
        }
    }
}

fn key(id: &str) -> String {
    format!("ACHIEVEMENT#{}", id)
}

fn s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

fn to_item(a: &Achievement) -> Item {
    let pk = key(&a.id);
    let mut item = HashMap::new();
    item.insert("PK".to_string(), s(pk.clone()));
    item.insert("SK".to_string(), s(pk));
    item.insert("id".to_string(), s(a.id.clone()));
    item.insert("user_id".to_string(), s(a.owner_id.clone()));
    item.insert("title".to_string(), s(a.title.clone()));
    item.insert("description".to_string(), s(a.description.clone()));
    item.insert("document".to_string(), s(a.document_ref.clone()));
    item.insert("status".to_string(), s(a.status.as_str()));
    if let Some(submitted) = a.submit_date {
        item.insert("submit_date".to_string(), s(submitted.to_rfc3339()));
    }
    item.insert("created_at".to_string(), s(a.created_at.to_rfc3339()));
    item.insert("updated_at".to_string(), s(a.updated_at.to_rfc3339()));
    item
}

fn text(item: &Item, name: &str) -> Option<String> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
}

fn required(item: &Item, name: &str) -> StoreResult<String> {
    text(item, name).ok_or_else(|| StoreError::Malformed(format!("missing attribute {}", name)))
}

fn timestamp(item: &Item, name: &str) -> StoreResult<Option<DateTime<Utc>>> {
    match text(item, name) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| StoreError::Malformed(format!("{} {:?}: {}", name, raw, e))),
    }
}

fn from_item(item: &Item) -> StoreResult<Achievement> {
    let raw_status = required(item, "status")?;
    let status = AchievementStatus::parse(&raw_status)
        .ok_or_else(|| StoreError::Malformed(format!("unknown status {:?}", raw_status)))?;
    let created_at = timestamp(item, "created_at")?
        .ok_or_else(|| StoreError::Malformed("missing attribute created_at".to_string()))?;

    Ok(Achievement {
        id: required(item, "id")?,
        owner_id: required(item, "user_id")?,
        title: text(item, "title").unwrap_or_default(),
        description: text(item, "description").unwrap_or_default(),
        document_ref: text(item, "document").unwrap_or_default(),
        status,
        submit_date: timestamp(item, "submit_date")?,
        created_at,
        updated_at: timestamp(item, "updated_at")?.unwrap_or(created_at),
    })
}

fn map_sdk_error<E, R>(op: &'static str, err: SdkError<E, R>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let detail = DisplayErrorContext(&err).to_string();
    tracing::error!("DynamoDB {} failed: {}", op, detail);
    match err {
        SdkError::TimeoutError(_) => StoreError::Unavailable(format!("{} timed out", op)),
        _ => StoreError::Unavailable(format!("{}: {}", op, detail)),
    }
}

/// `Ok(true)` when the write applied, `Ok(false)` when its condition did not match.
fn applied<O, E, R>(
    op: &'static str,
    result: Result<O, SdkError<E, R>>,
    is_condition_miss: fn(&E) -> bool,
) -> StoreResult<bool>
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match result {
        Ok(_) => Ok(true),
        Err(SdkError::ServiceError(ctx)) if is_condition_miss(ctx.err()) => Ok(false),
        Err(err) => Err(map_sdk_error(op, err)),
    }
}

#[async_trait]
impl AchievementStore for DynamoAchievementStore {
    async fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Achievement>> {
        let mut achievements = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let resp = self
                .client
                .query()
                .table_name(&self.table_name)
                .index_name(&self.owner_index)
                .key_condition_expression("user_id = :owner")
                .expression_attribute_values(":owner", s(owner_id))
                .scan_index_forward(false)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| map_sdk_error("achievements.list_by_owner", e))?;

            for item in resp.items() {
                achievements.push(from_item(item)?);
            }

            match resp.last_evaluated_key() {
                Some(last) if !last.is_empty() => start_key = Some(last.clone()),
                _ => break,
            }
        }

        Ok(achievements)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Achievement>> {
        let pk = key(id);
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", s(pk.clone()))
            .key("SK", s(pk))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| map_sdk_error("achievements.get", e))?;

        result.item().map(from_item).transpose()
    }

    async fn insert(&self, achievement: &Achievement) -> StoreResult<()> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(to_item(achievement)))
            .condition_expression("attribute_not_exists(PK)")
            .send()
            .await;

        if applied(
            "achievements.insert",
            result,
            PutItemError::is_conditional_check_failed_exception,
        )? {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!(
                "achievement {} already exists",
                achievement.id
            )))
        }
    }

    async fn update_draft(
        &self,
        id: &str,
        owner_id: &str,
        input: &AchievementInput,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let pk = key(id);
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", s(pk.clone()))
            .key("SK", s(pk))
            .update_expression(
                "SET #title = :title, #description = :description, #document = :document, updated_at = :updated_at",
            )
            .condition_expression(OWNED_DRAFT)
            .expression_attribute_names("#title", "title")
            .expression_attribute_names("#description", "description")
            .expression_attribute_names("#document", "document")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":title", s(input.title.clone()))
            .expression_attribute_values(":description", s(input.description.clone()))
            .expression_attribute_values(":document", s(input.document_ref.clone()))
            .expression_attribute_values(":updated_at", s(updated_at.to_rfc3339()))
            .expression_attribute_values(":owner", s(owner_id))
            .expression_attribute_values(":draft", s(AchievementStatus::Draft.as_str()))
            .send()
            .await;

        applied(
            "achievements.update_draft",
            result,
            UpdateItemError::is_conditional_check_failed_exception,
        )
    }

    async fn delete_draft(&self, id: &str, owner_id: &str) -> StoreResult<bool> {
        let pk = key(id);
        let result = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("PK", s(pk.clone()))
            .key("SK", s(pk))
            .condition_expression(OWNED_DRAFT)
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":owner", s(owner_id))
            .expression_attribute_values(":draft", s(AchievementStatus::Draft.as_str()))
            .send()
            .await;

        applied(
            "achievements.delete_draft",
            result,
            DeleteItemError::is_conditional_check_failed_exception,
        )
    }

    async fn submit_draft(
        &self,
        id: &str,
        owner_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let pk = key(id);
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", s(pk.clone()))
            .key("SK", s(pk))
            .update_expression("SET #status = :submitted, submit_date = :at, updated_at = :at")
            .condition_expression(OWNED_DRAFT)
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":submitted", s(AchievementStatus::Submitted.as_str()))
            .expression_attribute_values(":at", s(at.to_rfc3339()))
            .expression_attribute_values(":owner", s(owner_id))
            .expression_attribute_values(":draft", s(AchievementStatus::Draft.as_str()))
            .send()
            .await;

        applied(
            "achievements.submit_draft",
            result,
            UpdateItemError::is_conditional_check_failed_exception,
        )
    }
}
