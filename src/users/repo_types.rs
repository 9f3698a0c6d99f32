use serde::Serialize;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use crate::db::query::Record;
use crate::error::{AppError, AppResult};

/// Full `users` row, password hash included. Never leaves the service layer.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// User as returned to callers; there is no password field to leak.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl TryFrom<Record> for UserRow {
    type Error = AppError;

    fn try_from(record: Record) -> AppResult<Self> {
        Ok(Self {
            id: record.int("id")?,
            name: record.text("name")?,
            email: record.text("email")?,
            password_hash: record.opt_text("password_hash")?,
            is_active: record.boolean("is_active")?,
            created_at: parse_timestamp(&record.text("created_at")?)?,
            updated_at: parse_timestamp(&record.text("updated_at")?)?,
        })
    }
}

// Fixed width so that text order is chronological order.
pub fn format_timestamp(at: OffsetDateTime) -> AppResult<String> {
    at.format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
    ))
    .map_err(|e| AppError::Query(sqlx::Error::Protocol(format!("timestamp format: {e}"))))
}

pub fn parse_timestamp(raw: &str) -> AppResult<OffsetDateTime> {
    PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"),
    )
    .map(PrimitiveDateTime::assume_utc)
    .map_err(|e| AppError::Query(sqlx::Error::Decode(Box::new(e))))
}

/// Current UTC time truncated to the stored precision.
pub fn now_micros() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}

/// A write timestamp strictly after `previous`.
pub fn advance_from(previous: OffsetDateTime) -> OffsetDateTime {
    let now = now_micros();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}
