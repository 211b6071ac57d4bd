use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::model::{Role, User};
use crate::repository::{Filters, Page, DEFAULT_LIMIT};

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 50;
const EMAIL_MAX: usize = 300;
const PASSWORD_MIN: usize = 8;
const LIST_LIMIT_MAX: i64 = 1000;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= EMAIL_MAX && EMAIL_RE.is_match(email)
}

/// Trims and lower-cases an address before it reaches the store.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_password(password: &str, errors: &mut Vec<String>) {
    if password.chars().count() < PASSWORD_MIN {
        errors.push(format!("Password must be at least {PASSWORD_MIN} characters"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one digit".into());
    }
    if !password.chars().any(char::is_uppercase) {
        errors.push("Password must contain at least one uppercase letter".into());
    }
    if !password.chars().any(char::is_lowercase) {
        errors.push("Password must contain at least one lowercase letter".into());
    }
}

fn check_name(field: &str, value: &str, errors: &mut Vec<String>) {
    let len = value.chars().count();
    if len < NAME_MIN {
        errors.push(format!("{field} must be at least {NAME_MIN} characters"));
    } else if len > NAME_MAX {
        errors.push(format!("{field} must be at most {NAME_MAX} characters"));
    }
}

fn check_email(email: &str, errors: &mut Vec<String>) {
    if !is_valid_email(email) {
        errors.push("value is not a valid email address".into());
    }
}

fn into_result(errors: Vec<String>) -> Result<(), Vec<String>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Request body for creating a user.
#[derive(Debug, Clone, Deserialize)]
pub struct UserCreate {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl UserCreate {
    pub fn normalize(mut self) -> Self {
        self.email = normalize_email(&self.email);
        self
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        check_email(&self.email, &mut errors);
        check_password(&self.password, &mut errors);
        if let Some(name) = &self.first_name {
            check_name("first_name", name, &mut errors);
        }
        if let Some(name) = &self.last_name {
            check_name("last_name", name, &mut errors);
        }
        into_result(errors)
    }
}

/// Partial update input. A field that is missing or `null` is left unchanged.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
    pub is_verified: Option<bool>,
    pub role: Option<Role>,
}

impl UserUpdate {
    pub fn normalize(mut self) -> Self {
        self.email = self.email.as_deref().map(normalize_email);
        self
    }

    /// Drops the fields a user may not change on their own account.
    pub fn self_service(self) -> Self {
        Self {
            is_active: None,
            is_superuser: None,
            is_verified: None,
            role: None,
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if let Some(email) = &self.email {
            check_email(email, &mut errors);
        }
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            check_password(password, &mut errors);
        }
        if let Some(name) = &self.first_name {
            check_name("first_name", name, &mut errors);
        }
        if let Some(name) = &self.last_name {
            check_name("last_name", name, &mut errors);
        }
        into_result(errors)
    }
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublicUser {
    pub id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_verified: bool,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            is_active: u.is_active,
            is_superuser: u.is_superuser,
            is_verified: u.is_verified,
            role: u.role,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

/// Query string accepted by the user listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub email_contains: Option<String>,
    pub first_name_contains: Option<String>,
    pub last_name_contains: Option<String>,
    /// Comma separated roles, matched with IN.
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
    pub is_superuser: Option<bool>,
}

impl ListUsersQuery {
    pub fn into_parts(self) -> Result<(Page, Filters), Vec<String>> {
        let mut errors = Vec::new();
        let skip = self.skip.unwrap_or(0);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if skip < 0 {
            errors.push("skip must not be negative".into());
        }
        if !(1..=LIST_LIMIT_MAX).contains(&limit) {
            errors.push(format!("limit must be between 1 and {LIST_LIMIT_MAX}"));
        }

        let mut filters = Filters::new()
            .with("email_contains", self.email_contains)
            .with("first_name_contains", self.first_name_contains)
            .with("last_name_contains", self.last_name_contains)
            .with("is_active", self.is_active)
            .with("is_verified", self.is_verified)
            .with("is_superuser", self.is_superuser);

        if let Some(raw) = self.role {
            let mut roles = Vec::new();
            for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
                match part.parse::<Role>() {
                    Ok(role) => roles.push(role),
                    Err(e) => errors.push(e.to_string()),
                }
            }
            if !roles.is_empty() {
                filters.push("role", roles);
            }
        }

        into_result(errors)?;
        Ok((Page::new(skip, limit), filters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Value;

    fn create(email: &str, password: &str, first_name: Option<&str>) -> UserCreate {
        UserCreate {
            email: email.into(),
            password: password.into(),
            first_name: first_name.map(Into::into),
            last_name: Some("User".into()),
            role: Role::User,
        }
    }

    #[test]
    fn valid_create_passes() {
        assert!(create("test@example.com", "ValidPassword123", Some("Test"))
            .validate()
            .is_ok());
    }

    #[test]
    fn weak_passwords_are_rejected_with_reasons() {
        let cases = [
            ("NoDigitPassword", "at least one digit"),
            ("nouppercase123", "at least one uppercase letter"),
            ("NOLOWERCASE123", "at least one lowercase letter"),
            ("Short1", "at least 8 characters"),
        ];
        for (password, reason) in cases {
            let errors = create("test@example.com", password, None).validate().unwrap_err();
            assert!(
                errors.iter().any(|e| e.contains(reason)),
                "{password}: {errors:?}"
            );
        }
    }

    #[test]
    fn invalid_email_and_long_name_are_rejected() {
        let errors = create("invalid-email", "ValidPassword123", None)
            .validate()
            .unwrap_err();
        assert!(errors[0].contains("not a valid email address"));

        let long = "A".repeat(51);
        let errors = create("test@example.com", "ValidPassword123", Some(&long))
            .validate()
            .unwrap_err();
        assert!(errors[0].contains("at most 50 characters"));
    }

    #[test]
    fn update_validates_only_present_fields() {
        assert!(UserUpdate::default().validate().is_ok());
        assert!(UserUpdate {
            first_name: Some("OnlyFirst".into()),
            ..Default::default()
        }
        .validate()
        .is_ok());
        assert!(UserUpdate {
            first_name: Some("A".into()),
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(UserUpdate {
            email: Some("invalid-email".into()),
            ..Default::default()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn null_fields_deserialize_as_absent() {
        let update: UserUpdate =
            serde_json::from_str(r#"{"first_name": null, "last_name": ""}"#).unwrap();
        assert_eq!(update.first_name, None);
        assert_eq!(update.last_name.as_deref(), Some(""));
    }

    #[test]
    fn self_service_strips_privileged_fields() {
        let update = UserUpdate {
            first_name: Some("Ada".into()),
            role: Some(Role::Admin),
            is_active: Some(false),
            ..Default::default()
        }
        .self_service();
        assert_eq!(update.first_name.as_deref(), Some("Ada"));
        assert_eq!(update.role, None);
        assert_eq!(update.is_active, None);
    }

    #[test]
    fn list_query_builds_page_and_filters() {
        let query = ListUsersQuery {
            skip: Some(10),
            limit: Some(5),
            email_contains: Some("TECH".into()),
            role: Some("admin,USER".into()),
            ..Default::default()
        };
        let (page, filters) = query.into_parts().unwrap();
        assert_eq!(page, Page::new(10, 5));
        let pairs: Vec<(&str, &Value)> = filters.iter().collect();
        assert!(pairs.contains(&("email_contains", &Value::Text("TECH".into()))));
        assert!(pairs.contains(&(
            "role",
            &Value::List(vec![Value::Text("ADMIN".into()), Value::Text("USER".into())])
        )));
    }

    #[test]
    fn blank_role_list_adds_no_filter() {
        for raw in ["", ",", " , "] {
            let query = ListUsersQuery {
                role: Some(raw.into()),
                ..Default::default()
            };
            let (_, filters) = query.into_parts().unwrap();
            assert!(filters.iter().all(|(key, _)| key != "role"), "{raw:?}");
        }
    }

    #[test]
    fn list_query_rejects_bad_paging_and_roles() {
        let query = ListUsersQuery {
            limit: Some(0),
            role: Some("root".into()),
            ..Default::default()
        };
        let errors = query.into_parts().unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
