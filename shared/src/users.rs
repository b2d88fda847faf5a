use crate::error::{ServiceError, ServiceResult, StoreError};
use crate::password::PasswordDigest;
use crate::store::{bounded, UserStore};
use crate::types::{
    total_pages, AssignRoleRequest, CreateUserRequest, NewUser, PageMeta, UpdateUserRequest,
    User, UserChanges, UserPage, UserQuery,
};
use crate::validation::{parse_row_id, validate_create_user, validate_role_id, validate_update_user};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const USER_NOT_FOUND: &str = "user not found";
const ROLE_NOT_FOUND: &str = "role not found";
const USERNAME_TAKEN: &str = "username already exists";

/// Admin-facing user management over the relational store.
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn UserStore>,
    digest: Arc<dyn PasswordDigest>,
    timeout: Duration,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn UserStore>, digest: Arc<dyn PasswordDigest>, timeout: Duration) -> Self {
        Self {
            store,
            digest,
            timeout,
        }
    }

    pub async fn list(&self, query: UserQuery) -> ServiceResult<UserPage> {
        let query = query.clamped();
        let (items, total) = bounded(self.timeout, "users.list", self.store.list(&query)).await?;
        tracing::info!(
            "Listed {} of {} users (page {}, limit {})",
            items.len(),
            total,
            query.page,
            query.limit
        );
        Ok(UserPage {
            items,
            meta: PageMeta {
                page: query.page,
                limit: query.limit,
                total,
                total_pages: total_pages(total, query.limit),
                sort_by: query.sort_by,
                order: query.order,
                search: query.search,
            },
        })
    }

    pub async fn get(&self, id: &str) -> ServiceResult<User> {
        let id = parse_row_id(id).ok_or_else(|| ServiceError::not_found(USER_NOT_FOUND))?;
        self.fetch(id).await
    }

    pub async fn create(&self, req: CreateUserRequest) -> ServiceResult<User> {
        let role_id = validate_create_user(&req)?;
        let username = req.username.trim().to_string();

        if self.username_owner(&username).await?.is_some() {
            return Err(ServiceError::Conflict(USERNAME_TAKEN.to_string()));
        }
        if !bounded(self.timeout, "roles.exists", self.store.role_exists(role_id)).await? {
            return Err(ServiceError::not_found(ROLE_NOT_FOUND));
        }

        let password_digest = self.digest.hash(&req.password).map_err(|e| {
            tracing::error!("Password hashing failed: {}", e);
            ServiceError::Internal("failed to hash password".to_string())
        })?;

        let new_user = NewUser {
            username,
            email: req.email.trim().to_lowercase(),
            password_digest,
            full_name: req.full_name.trim().to_string(),
            role_id,
        };
        // A unique violation here means another insert of the same username won the race.
        let id = bounded(self.timeout, "users.insert", self.store.insert(&new_user))
            .await
            .map_err(username_conflict)?;
        tracing::info!("Created user {} ({})", new_user.username, id);

        self.fetch(id).await
    }

    pub async fn update(&self, id: &str, req: UpdateUserRequest) -> ServiceResult<User> {
        validate_update_user(&req)?;
        let id = parse_row_id(id).ok_or_else(|| ServiceError::not_found(USER_NOT_FOUND))?;
        self.fetch(id).await?;

        let changes = UserChanges {
            username: req.username.trim().to_string(),
            email: req.email.trim().to_lowercase(),
            full_name: req.full_name.trim().to_string(),
            is_active: req.is_active,
        };
        if let Some(owner) = self.username_owner(&changes.username).await? {
            if owner != id {
                return Err(ServiceError::Conflict(USERNAME_TAKEN.to_string()));
            }
        }

        let updated = bounded(self.timeout, "users.update", self.store.update(id, &changes))
            .await
            .map_err(username_conflict)?;
        if !updated {
            return Err(ServiceError::not_found(USER_NOT_FOUND));
        }
        tracing::info!("Updated user {}", id);
        self.fetch(id).await
    }

    pub async fn delete(&self, id: &str) -> ServiceResult<()> {
        let id = parse_row_id(id).ok_or_else(|| ServiceError::not_found(USER_NOT_FOUND))?;
        let deleted = bounded(self.timeout, "users.delete", self.store.delete(id)).await?;
        if !deleted {
            return Err(ServiceError::not_found(USER_NOT_FOUND));
        }
        tracing::info!("Deleted user {}", id);
        Ok(())
    }

    pub async fn assign_role(&self, id: &str, req: AssignRoleRequest) -> ServiceResult<User> {
        let id = parse_row_id(id).ok_or_else(|| ServiceError::not_found(USER_NOT_FOUND))?;
        self.fetch(id).await?;

        let role_id = validate_role_id(&req.role_id)?;
        if !bounded(self.timeout, "roles.exists", self.store.role_exists(role_id)).await? {
            return Err(ServiceError::not_found(ROLE_NOT_FOUND));
        }

        let assigned =
            bounded(self.timeout, "users.set_role", self.store.set_role(id, role_id)).await?;
        if !assigned {
            return Err(ServiceError::not_found(USER_NOT_FOUND));
        }
        tracing::info!("Assigned role {} to user {}", role_id, id);
        self.fetch(id).await
    }

    async fn fetch(&self, id: Uuid) -> ServiceResult<User> {
        bounded(self.timeout, "users.get", self.store.get(id))
            .await?
            .ok_or_else(|| ServiceError::not_found(USER_NOT_FOUND))
    }

    async fn username_owner(&self, username: &str) -> ServiceResult<Option<Uuid>> {
        let found = bounded(
            self.timeout,
            "users.find_by_username",
            self.store.find_by_username(username),
        )
        .await?;
        Ok(found.map(|u| u.id))
    }
}

/// Storage reports the constraint name; callers get the same message as the pre-check.
fn username_conflict(err: StoreError) -> ServiceError {
    match ServiceError::from(err) {
        ServiceError::Conflict(_) => ServiceError::Conflict(USERNAME_TAKEN.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::Argon2Digest;
    use crate::store::memory::MemoryRelationalStore;
    use crate::error::StoreResult;
    use crate::types::{Role, SortColumn, SortOrder};
    use async_trait::async_trait;

    /// Stores the plain text reversed; hashing with argon2 in every test is slow.
    struct ReversedDigest;

    impl PasswordDigest for ReversedDigest {
        fn hash(&self, plain: &str) -> Result<String, String> {
            Ok(plain.chars().rev().collect())
        }
        fn verify(&self, plain: &str, digest: &str) -> bool {
            plain.chars().rev().collect::<String>() == digest
        }
    }

    /// Misses every username lookup and fails writes with the raw constraint name, as
    /// PostgreSQL does when two writers race past the pre-check.
    struct RacingUsernames(Arc<MemoryRelationalStore>);

    #[async_trait]
    impl UserStore for RacingUsernames {
        async fn list(&self, query: &UserQuery) -> StoreResult<(Vec<User>, u64)> {
            self.0.list(query).await
        }
        async fn get(&self, id: Uuid) -> StoreResult<Option<User>> {
            self.0.get(id).await
        }
        async fn find_by_username(&self, _: &str) -> StoreResult<Option<User>> {
            Ok(None)
        }
        async fn insert(&self, _: &NewUser) -> StoreResult<Uuid> {
            Err(StoreError::Conflict("users_username_key".into()))
        }
        async fn update(&self, _: Uuid, _: &UserChanges) -> StoreResult<bool> {
            Err(StoreError::Conflict("users_username_key".into()))
        }
        async fn delete(&self, id: Uuid) -> StoreResult<bool> {
            self.0.delete(id).await
        }
        async fn role_exists(&self, role_id: Uuid) -> StoreResult<bool> {
            self.0.role_exists(role_id).await
        }
        async fn set_role(&self, user_id: Uuid, role_id: Uuid) -> StoreResult<bool> {
            self.0.set_role(user_id, role_id).await
        }
    }

    fn setup() -> (UserDirectory, Arc<MemoryRelationalStore>, Role) {
        let store = Arc::new(MemoryRelationalStore::new());
        let role = store.add_role("Mahasiswa", "Student");
        let directory =
            UserDirectory::new(store.clone(), Arc::new(ReversedDigest), Duration::from_secs(2));
        (directory, store, role)
    }

    fn request(username: &str, role: &Role) -> CreateUserRequest {
        CreateUserRequest {
            username: username.to_string(),
            email: format!("{}@Uni.AC.id", username),
            password: "secret123".to_string(),
            full_name: format!("{} Example", username),
            role_id: role.id.to_string(),
        }
    }

    #[tokio::test]
    async fn create_hashes_password_and_normalises_email() {
        let (directory, _, role) = setup();
        let user = directory.create(request("ana", &role)).await.unwrap();
        assert_eq!(user.email, "ana@uni.ac.id");
        assert_eq!(user.password_digest, "321terces");
        assert_eq!(user.role.as_ref().map(|r| r.name.as_str()), Some("Mahasiswa"));
        assert!(user.is_active);

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_digest").is_none());
    }

    #[tokio::test]
    async fn create_with_real_argon2_digest() {
        let store = Arc::new(MemoryRelationalStore::new());
        let role = store.add_role("Admin", "Administrator");
        let directory = UserDirectory::new(store, Arc::new(Argon2Digest), Duration::from_secs(5));
        let user = directory.create(request("root", &role)).await.unwrap();
        assert!(user.password_digest.starts_with("$argon2"));
        assert!(Argon2Digest.verify("secret123", &user.password_digest));
    }

    #[tokio::test]
    async fn duplicate_username_conflicts_without_writing() {
        let (directory, store, role) = setup();
        directory.create(request("ana", &role)).await.unwrap();

        let err = directory.create(request("ana", &role)).await.unwrap_err();
        assert_eq!(err, ServiceError::Conflict(USERNAME_TAKEN.into()));
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn create_validates_before_touching_store() {
        let (directory, store, role) = setup();
        let mut short = request("ana", &role);
        short.password = "12345".into();
        assert_eq!(directory.create(short).await.unwrap_err().kind(), "validation_error");

        let mut bad_role = request("ana", &role);
        bad_role.role_id = "mahasiswa".into();
        assert_eq!(
            directory.create(bad_role).await.unwrap_err(),
            ServiceError::validation("role id must be a valid UUID")
        );

        let mut unknown_role = request("ana", &role);
        unknown_role.role_id = Uuid::new_v4().to_string();
        assert_eq!(
            directory.create(unknown_role).await.unwrap_err(),
            ServiceError::not_found(ROLE_NOT_FOUND)
        );
        assert_eq!(store.user_count(), 0);
    }

    #[tokio::test]
    async fn second_page_holds_items_eleven_to_twenty() {
        let (directory, _, role) = setup();
        for i in 1..=25 {
            directory
                .create(request(&format!("user{:02}", i), &role))
                .await
                .unwrap();
        }

        let query = UserQuery::from_params(Some("2"), Some("10"), Some("username"), None, None);
        let page = directory.list(query).await.unwrap();
        let names: Vec<&str> = page.items.iter().map(|u| u.username.as_str()).collect();
        let expected: Vec<String> = (11..=20).map(|i| format!("user{:02}", i)).collect();
        assert_eq!(names, expected);
        assert_eq!(page.meta.total, 25);
        assert_eq!(page.meta.total_pages, 3);
        assert_eq!(page.meta.page, 2);
    }

    #[tokio::test]
    async fn disallowed_sort_column_falls_back_to_created_at() {
        let (directory, _, role) = setup();
        directory.create(request("zed", &role)).await.unwrap();
        directory.create(request("amy", &role)).await.unwrap();

        let query =
            UserQuery::from_params(None, None, Some("password_hash"), Some("desc"), None);
        let page = directory.list(query).await.unwrap();
        assert_eq!(page.meta.sort_by, SortColumn::CreatedAt);
        assert_eq!(page.meta.order, SortOrder::Desc);
        assert_eq!(page.items.len(), 2);
    }

    #[tokio::test]
    async fn search_matches_name_and_email_case_insensitively() {
        let (directory, _, role) = setup();
        directory.create(request("ana", &role)).await.unwrap();
        directory.create(request("budi", &role)).await.unwrap();

        let query = UserQuery::from_params(None, None, None, None, Some("BUDI"));
        let page = directory.list(query).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].username, "budi");
        assert_eq!(page.meta.search, "BUDI");
    }

    #[tokio::test]
    async fn update_rejects_username_held_by_someone_else() {
        let (directory, _, role) = setup();
        let ana = directory.create(request("ana", &role)).await.unwrap();
        directory.create(request("budi", &role)).await.unwrap();

        let rename = |username: &str| UpdateUserRequest {
            username: username.to_string(),
            email: "ana@uni.ac.id".into(),
            full_name: "Ana Updated".into(),
            is_active: false,
        };
        let err = directory
            .update(&ana.id.to_string(), rename("budi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let kept = directory.update(&ana.id.to_string(), rename("ana")).await.unwrap();
        assert_eq!(kept.full_name, "Ana Updated");
        assert!(!kept.is_active);
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids_are_not_found() {
        let (directory, _, _) = setup();
        for id in ["nope".to_string(), Uuid::new_v4().to_string()] {
            assert_eq!(directory.get(&id).await.unwrap_err().kind(), "not_found");
            assert_eq!(directory.delete(&id).await.unwrap_err().kind(), "not_found");
        }
    }

    #[tokio::test]
    async fn assign_role_checks_user_then_role() {
        let (directory, store, role) = setup();
        let admin = store.add_role("Admin", "Administrator");
        let ana = directory.create(request("ana", &role)).await.unwrap();
        let id = ana.id.to_string();

        let missing_user = directory
            .assign_role(
                &Uuid::new_v4().to_string(),
                AssignRoleRequest {
                    role_id: admin.id.to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(missing_user, ServiceError::not_found(USER_NOT_FOUND));

        let empty = directory
            .assign_role(&id, AssignRoleRequest { role_id: String::new() })
            .await
            .unwrap_err();
        assert_eq!(empty, ServiceError::validation("role id is required"));

        let ghost = directory
            .assign_role(
                &id,
                AssignRoleRequest {
                    role_id: Uuid::new_v4().to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(ghost, ServiceError::not_found(ROLE_NOT_FOUND));

        let promoted = directory
            .assign_role(
                &id,
                AssignRoleRequest {
                    role_id: admin.id.to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(promoted.role_id, admin.id);
        assert_eq!(promoted.role.map(|r| r.name), Some("Admin".to_string()));
    }

    #[tokio::test]
    async fn storage_unique_violation_reads_as_username_taken() {
        let inner = Arc::new(MemoryRelationalStore::new());
        let role = inner.add_role("Mahasiswa", "Student");
        let id = inner
            .insert(&NewUser {
                username: "ana".into(),
                email: "ana@uni.ac.id".into(),
                password_digest: "digest".into(),
                full_name: "Ana".into(),
                role_id: role.id,
            })
            .await
            .unwrap();
        let directory = UserDirectory::new(
            Arc::new(RacingUsernames(inner)),
            Arc::new(ReversedDigest),
            Duration::from_secs(2),
        );

        let expected = ServiceError::Conflict(USERNAME_TAKEN.into());
        assert_eq!(directory.create(request("budi", &role)).await.unwrap_err(), expected);

        let rename = UpdateUserRequest {
            username: "budi".into(),
            email: "ana@uni.ac.id".into(),
            full_name: "Ana".into(),
            is_active: true,
        };
        assert_eq!(
            directory.update(&id.to_string(), rename).await.unwrap_err(),
            expected
        );
    }

    #[tokio::test]
    async fn out_of_range_paging_is_clamped_not_panicking() {
        let (directory, _, role) = setup();
        directory.create(request("ana", &role)).await.unwrap();

        let page = directory
            .list(UserQuery {
                page: 0,
                limit: 0,
                ..UserQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.meta.page, 1);
        assert_eq!(page.meta.limit, 1);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.meta.total_pages, 1);
    }

    #[tokio::test]
    async fn delete_removes_user() {
        let (directory, store, role) = setup();
        let ana = directory.create(request("ana", &role)).await.unwrap();
        directory.delete(&ana.id.to_string()).await.unwrap();
        assert_eq!(store.user_count(), 0);
    }
}
