use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ========== PRINCIPAL ==========
/// Authenticated caller, as resolved by the access gate in front of this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub role: String,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }
}

// ========== ACHIEVEMENT ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AchievementStatus {
    Draft,
    Submitted,
    Verified,
    Rejected,
}

impl AchievementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementStatus::Draft => "draft",
            AchievementStatus::Submitted => "submitted",
            AchievementStatus::Verified => "verified",
            AchievementStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(AchievementStatus::Draft),
            "submitted" => Some(AchievementStatus::Submitted),
            "verified" => Some(AchievementStatus::Verified),
            "rejected" => Some(AchievementStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for AchievementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Achievement document, as held by the primary store.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Achievement {
    pub id: String,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "document")]
    pub document_ref: String,
    pub status: AchievementStatus,
    pub submit_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of create and update requests.
#[derive(Debug, Deserialize, Clone)]
pub struct AchievementInput {
    pub title: String,
    pub description: String,
    #[serde(rename = "document")]
    pub document_ref: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct SubmitAchievementRequest {
    #[serde(default)]
    pub notes: String,
}

// ========== ACHIEVEMENT MIRROR ==========
/// Relational copy of an achievement's metadata, kept for joins and reporting.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AchievementMirror {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub primary_ref: String,
    pub title: String,
    pub status: AchievementStatus,
    pub submit_date: Option<DateTime<Utc>>,
    pub notes: String,
    pub verified_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields copied from the primary record onto an existing mirror row.
/// `notes: None` leaves the stored notes untouched.
#[derive(Debug, Clone)]
pub struct MirrorSync {
    pub primary_ref: String,
    pub title: String,
    pub status: AchievementStatus,
    pub submit_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileOutcome {
    Updated,
    Inserted,
    Removed,
    Unchanged,
}

// ========== ROLE ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

// ========== USER ==========
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_digest: String,
    pub full_name: String,
    pub is_active: bool,
    pub role_id: Uuid,
    pub role: Option<Role>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[serde(default)]
    pub role_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    #[serde(default)]
    pub role_id: String,
}

/// Validated insert for the users table; `password_digest` is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_digest: String,
    pub full_name: String,
    pub role_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct UserChanges {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub is_active: bool,
}

// ========== USER LISTING ==========
/// Columns a user listing may be ordered by. Anything else falls back to `created_at`.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    Id,
    Username,
    Email,
    FullName,
    #[default]
    CreatedAt,
}

impl SortColumn {
    pub fn parse(value: &str) -> Self {
        match value {
            "id" => SortColumn::Id,
            "username" => SortColumn::Username,
            "email" => SortColumn::Email,
            "full_name" => SortColumn::FullName,
            _ => SortColumn::CreatedAt,
        }
    }

    /// Qualified column name for ORDER BY; only ever produced from this closed set.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortColumn::Id => "u.id",
            SortColumn::Username => "u.username",
            SortColumn::Email => "u.email",
            SortColumn::FullName => "u.full_name",
            SortColumn::CreatedAt => "u.created_at",
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct UserQuery {
    pub page: u32,
    pub limit: u32,
    pub sort_by: SortColumn,
    pub order: SortOrder,
    pub search: String,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            sort_by: SortColumn::default(),
            order: SortOrder::default(),
            search: String::new(),
        }
    }
}

impl UserQuery {
    /// Normalises raw query-string values. Nothing here ever fails.
    pub fn from_params(
        page: Option<&str>,
        limit: Option<&str>,
        sort_by: Option<&str>,
        order: Option<&str>,
        search: Option<&str>,
    ) -> Self {
        let page = page
            .and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1);
        let limit = limit
            .and_then(|l| l.trim().parse::<u32>().ok())
            .filter(|l| *l >= 1)
            .map(|l| l.min(MAX_PAGE_LIMIT))
            .unwrap_or(DEFAULT_PAGE_LIMIT);

        Self {
            page,
            limit,
            sort_by: sort_by.map(SortColumn::parse).unwrap_or_default(),
            order: order.map(SortOrder::parse).unwrap_or_default(),
            search: search.map(|s| s.trim().to_string()).unwrap_or_default(),
        }
    }

    /// Page and limit forced into range, for queries not built through `from_params`.
    pub fn clamped(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, MAX_PAGE_LIMIT),
            ..self
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64).saturating_sub(1) * self.limit as u64
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    pub sort_by: SortColumn,
    pub order: SortOrder,
    pub search: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct UserPage {
    pub items: Vec<User>,
    pub meta: PageMeta,
}

pub fn total_pages(total: u64, limit: u32) -> u64 {
    if limit == 0 {
        return 0;
    }
    total.div_ceil(limit as u64)
}
