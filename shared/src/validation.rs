use crate::error::{ServiceError, ServiceResult};
use crate::types::{AchievementInput, CreateUserRequest, UpdateUserRequest};
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

const TITLE_MIN: usize = 3;
const TITLE_MAX: usize = 255;
const DESCRIPTION_MIN: usize = 10;
const USERNAME_MIN: usize = 3;
const PASSWORD_MIN: usize = 6;

/// Generates a 24-hex-character document id: 4 bytes of unix seconds, then 8 random bytes.
pub fn new_object_id() -> String {
    let secs = chrono::Utc::now().timestamp() as u32;
    let random = Uuid::new_v4();
    let mut id = format!("{:08x}", secs);
    for byte in &random.as_bytes()[..8] {
        id.push_str(&format!("{:02x}", byte));
    }
    id
}

pub fn is_object_id(value: &str) -> bool {
    value.len() == 24 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Relational ids are UUIDs; anything else can never match a row.
pub fn parse_row_id(value: &str) -> Option<Uuid> {
    Uuid::parse_str(value.trim()).ok()
}

pub fn validate_achievement(input: &AchievementInput) -> ServiceResult<()> {
    let title_len = input.title.trim().chars().count();
    if title_len < TITLE_MIN {
        return Err(ServiceError::validation("title must be at least 3 characters"));
    }
    if input.title.chars().count() > TITLE_MAX {
        return Err(ServiceError::validation("title must be at most 255 characters"));
    }
    if input.description.trim().chars().count() < DESCRIPTION_MIN {
        return Err(ServiceError::validation(
            "description must be at least 10 characters",
        ));
    }
    if input.document_ref.trim().is_empty() {
        return Err(ServiceError::validation("document is required"));
    }
    Ok(())
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("email pattern compiles")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email)
}

fn validate_profile(username: &str, email: &str, full_name: &str) -> ServiceResult<()> {
    if username.trim().chars().count() < USERNAME_MIN {
        return Err(ServiceError::validation(
            "username must be at least 3 characters",
        ));
    }
    if !is_valid_email(email.trim()) {
        return Err(ServiceError::validation("invalid email format"));
    }
    if full_name.trim().is_empty() {
        return Err(ServiceError::validation("full name is required"));
    }
    Ok(())
}

/// Returns the parsed role id on success.
pub fn validate_create_user(req: &CreateUserRequest) -> ServiceResult<Uuid> {
    validate_profile(&req.username, &req.email, &req.full_name)?;
    if req.password.chars().count() < PASSWORD_MIN {
        return Err(ServiceError::validation(
            "password must be at least 6 characters",
        ));
    }
    validate_role_id(&req.role_id)
}

pub fn validate_update_user(req: &UpdateUserRequest) -> ServiceResult<()> {
    validate_profile(&req.username, &req.email, &req.full_name)
}

pub fn validate_role_id(role_id: &str) -> ServiceResult<Uuid> {
    if role_id.trim().is_empty() {
        return Err(ServiceError::validation("role id is required"));
    }
    parse_row_id(role_id).ok_or_else(|| ServiceError::validation("role id must be a valid UUID"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(title: &str, description: &str, document: &str) -> AchievementInput {
        AchievementInput {
            title: title.to_string(),
            description: description.to_string(),
            document_ref: document.to_string(),
        }
    }

    #[test]
    fn object_ids_are_24_hex() {
        let id = new_object_id();
        assert!(is_object_id(&id), "{id}");
        assert_ne!(id, new_object_id());
        assert!(!is_object_id("not-an-id"));
        assert!(!is_object_id("65f0c0ffee0000000000abcz"));
    }

    #[test]
    fn achievement_field_bounds() {
        assert!(validate_achievement(&input("Won", "Placed 1st among 40", "doc")).is_ok());
        assert!(validate_achievement(&input("Wo", "Placed 1st among 40", "doc")).is_err());
        assert!(validate_achievement(&input(&"t".repeat(256), "Placed 1st among 40", "doc")).is_err());
        assert!(validate_achievement(&input("Won", "too short", "doc")).is_err());
        assert!(validate_achievement(&input("Won", "Placed 1st among 40", "  ")).is_err());
    }

    #[test]
    fn email_pattern_matches_standard_addresses() {
        assert!(is_valid_email("ana.maria+test@uni.ac.id"));
        assert!(!is_valid_email("ana@localhost"));
        assert!(!is_valid_email("not an email"));
    }

    #[test]
    fn create_user_requires_role_uuid() {
        let mut req = CreateUserRequest {
            username: "ana".into(),
            email: "ana@uni.ac.id".into(),
            password: "secret1".into(),
            full_name: "Ana Maria".into(),
            role_id: String::new(),
        };
        assert_eq!(
            validate_create_user(&req),
            Err(ServiceError::validation("role id is required"))
        );
        req.role_id = "admin".into();
        assert!(validate_create_user(&req).is_err());
        req.role_id = Uuid::new_v4().to_string();
        assert!(validate_create_user(&req).is_ok());
        req.password = "12345".into();
        assert!(validate_create_user(&req).is_err());
    }
}
