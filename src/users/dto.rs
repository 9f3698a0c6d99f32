use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::users::services::{NewUser, UserChanges};

const NAME_MAX: usize = 100;
const EMAIL_MAX: usize = 255;
const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 100;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}
fn default_active() -> bool { true }

/// Absent and `null` fields both mean "leave unchanged".
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 { 100 }

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_search_limit")]
    pub limit: i64,
}
fn default_search_limit() -> i64 { 50 }

impl CreateUserRequest {
    pub fn validate(self) -> AppResult<NewUser> {
        let name = validate_name(self.name)?;
        let email = validate_email(self.email)?;
        if let Some(password) = &self.password {
            let len = password.chars().count();
            if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
                return Err(AppError::Validation(format!(
                    "password must be {PASSWORD_MIN} to {PASSWORD_MAX} characters"
                )));
            }
        }
        Ok(NewUser {
            name,
            email,
            password: self.password,
            is_active: self.is_active,
        })
    }
}

impl UpdateUserRequest {
    pub fn validate(self) -> AppResult<UserChanges> {
        Ok(UserChanges {
            name: self.name.map(validate_name).transpose()?,
            email: self.email.map(validate_email).transpose()?,
            is_active: self.is_active,
        })
    }
}

impl Pagination {
    pub fn validate(&self) -> AppResult<()> {
        if !(1..=500).contains(&self.limit) {
            return Err(AppError::Validation("limit must be between 1 and 500".into()));
        }
        if self.offset < 0 {
            return Err(AppError::Validation("offset must not be negative".into()));
        }
        Ok(())
    }
}

impl SearchQuery {
    pub fn validate(&self) -> AppResult<()> {
        let len = self.q.chars().count();
        if !(1..=100).contains(&len) {
            return Err(AppError::Validation("q must be 1 to 100 characters".into()));
        }
        if !(1..=200).contains(&self.limit) {
            return Err(AppError::Validation("limit must be between 1 and 200".into()));
        }
        Ok(())
    }
}

fn validate_name(name: String) -> AppResult<String> {
    let name = name.trim().to_owned();
    let len = name.chars().count();
    if len == 0 || len > NAME_MAX {
        return Err(AppError::Validation(format!("name must be 1 to {NAME_MAX} characters")));
    }
    Ok(name)
}

fn validate_email(email: String) -> AppResult<String> {
    let email = email.trim().to_owned();
    if email.len() > EMAIL_MAX || !EMAIL_RE.is_match(&email) {
        return Err(AppError::Validation("invalid email address".into()));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(name: &str, email: &str, password: Option<&str>) -> CreateUserRequest {
        CreateUserRequest {
            name: name.into(),
            email: email.into(),
            password: password.map(Into::into),
            is_active: true,
        }
    }

    #[test]
    fn create_request_trims_and_accepts_valid_input() {
        let user = create("  Ann ", " ann@x.com ", Some("long-enough")).validate().unwrap();
        assert_eq!(user.name, "Ann");
        assert_eq!(user.email, "ann@x.com");
        assert_eq!(user.password.as_deref(), Some("long-enough"));
    }

    #[test]
    fn create_request_rejects_bad_fields() {
        for req in [
            create("   ", "ann@x.com", None),
            create(&"n".repeat(101), "ann@x.com", None),
            create("Ann", "not-an-email", None),
            create("Ann", &format!("{}@x.com", "a".repeat(250)), None),
            create("Ann", "ann@x.com", Some("short")),
        ] {
            assert!(matches!(req.validate(), Err(AppError::Validation(_))));
        }
    }

    #[test]
    fn update_request_validates_only_present_fields() {
        let changes = UpdateUserRequest {
            name: Some("X".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(changes.name.as_deref(), Some("X"));
        assert!(changes.email.is_none());

        let bad = UpdateUserRequest {
            email: Some("nope".into()),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn query_bounds() {
        assert!(Pagination { limit: 100, offset: 0 }.validate().is_ok());
        assert!(Pagination { limit: 0, offset: 0 }.validate().is_err());
        assert!(Pagination { limit: 501, offset: 0 }.validate().is_err());
        assert!(Pagination { limit: 10, offset: -1 }.validate().is_err());

        assert!(SearchQuery { q: "an".into(), limit: 50 }.validate().is_ok());
        assert!(SearchQuery { q: String::new(), limit: 50 }.validate().is_err());
        assert!(SearchQuery { q: "an".into(), limit: 201 }.validate().is_err());
    }
}
