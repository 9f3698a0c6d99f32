//! User business rules on top of the unit-of-work scopes.
//!
//! Each public operation runs inside exactly one scope, so its statements
//! commit or roll back together on a single pooled connection.

use std::sync::Arc;

use sqlx::SqliteConnection;
use tracing::{info, instrument, warn};

use crate::auth::password::hash_password;
use crate::db::query::Value;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::users::repo::{contains_pattern, InsertUser, UserColumn};
use crate::users::repo_types::{advance_from, format_timestamp, now_micros, User, UserRow};

/// Input for `create`. Shape (lengths, email syntax) is checked by the caller.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: Option<String>,
    pub is_active: bool,
}

/// Partial update: `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.is_active.is_none()
    }
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<Database>,
}

impl UserService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> AppResult<User> {
        let found = self
            .db
            .read_transaction(move |conn| {
                Box::pin(async move { UserRow::find_by_id(conn, id).await })
            })
            .await?;

        match found {
            Some(row) => Ok(row.into()),
            None => {
                warn!(user_id = id, "user not found");
                Err(AppError::NotFound(id))
            }
        }
    }

    /// Newest first. Bounding `limit`/`offset` is the caller's job.
    #[instrument(skip(self))]
    pub async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<User>> {
        let rows = self
            .db
            .read_transaction(move |conn| {
                Box::pin(async move { UserRow::list(conn, limit, offset).await })
            })
            .await?;
        info!(count = rows.len(), "listed users");
        Ok(rows.into_iter().map(User::from).collect())
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create(&self, input: NewUser) -> AppResult<User> {
        let password_hash = input.password.as_deref().map(hash_password).transpose()?;

        let created = self
            .db
            .transaction(move |conn| {
                Box::pin(async move {
                    if UserRow::find_by_email(conn, &input.email).await?.is_some() {
                        return Err(AppError::DuplicateEmail(input.email));
                    }

                    let id = insert_user(
                        conn,
                        &InsertUser {
                            name: &input.name,
                            email: &input.email,
                            password_hash: password_hash.as_deref(),
                            is_active: input.is_active,
                            at: now_micros(),
                        },
                    )
                    .await?;

                    UserRow::find_by_id(conn, id)
                        .await?
                        .ok_or(AppError::NotFound(id))
                })
            })
            .await;

        match created {
            Ok(row) => {
                info!(user_id = row.id, "created user");
                Ok(row.into())
            }
            Err(e) => {
                if let AppError::DuplicateEmail(email) = &e {
                    warn!(%email, "user creation rejected: email already exists");
                }
                Err(e)
            }
        }
    }

    #[instrument(skip(self, changes))]
    pub async fn update(&self, id: i64, changes: UserChanges) -> AppResult<User> {
        let updated = self
            .db
            .transaction(move |conn| {
                Box::pin(async move {
                    let existing = UserRow::find_by_id(conn, id)
                        .await?
                        .ok_or(AppError::NotFound(id))?;

                    if let Some(email) = changes.email.as_deref() {
                        if let Some(holder) = UserRow::find_by_email(conn, email).await? {
                            if holder.id != id {
                                return Err(AppError::DuplicateEmail(email.to_owned()));
                            }
                        }
                    }

                    apply_changes(conn, &existing, changes).await?;

                    UserRow::find_by_id(conn, id)
                        .await?
                        .ok_or(AppError::NotFound(id))
                })
            })
            .await;

        match updated {
            Ok(row) => {
                info!(user_id = id, "updated user");
                Ok(row.into())
            }
            Err(e) => {
                match &e {
                    AppError::NotFound(_) => warn!(user_id = id, "user update failed: not found"),
                    AppError::DuplicateEmail(email) => {
                        warn!(user_id = id, %email, "user update rejected: email already exists")
                    }
                    _ => {}
                }
                Err(e)
            }
        }
    }

    /// Physical delete. `false` when no row had this id.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> AppResult<bool> {
        let removed = self
            .db
            .transaction(move |conn| Box::pin(async move { UserRow::delete(conn, id).await }))
            .await?;

        let deleted = removed > 0;
        if deleted {
            info!(user_id = id, "deleted user");
        } else {
            warn!(user_id = id, "user deletion failed: not found");
        }
        Ok(deleted)
    }

    /// Substring match on `name`. An empty term matches every user, up to `limit`.
    #[instrument(skip(self))]
    pub async fn search(&self, term: &str, limit: i64) -> AppResult<Vec<User>> {
        let pattern = contains_pattern(term);
        let rows = self
            .db
            .read_transaction(move |conn| {
                Box::pin(async move { UserRow::search_by_name(conn, &pattern, limit).await })
            })
            .await?;
        info!(count = rows.len(), "searched users");
        Ok(rows.into_iter().map(User::from).collect())
    }
}

/// Insert, folding a unique-index rejection into `DuplicateEmail`.
///
/// The pre-check in `create` is only a fast path; this is where a lost race
/// against a concurrent writer lands.
pub(crate) async fn insert_user(
    conn: &mut SqliteConnection,
    user: &InsertUser<'_>,
) -> AppResult<i64> {
    UserRow::insert(conn, user)
        .await
        .map_err(|e| email_conflict(e, user.email))
}

/// Write only the supplied fields; an empty change set writes nothing.
pub(crate) async fn apply_changes(
    conn: &mut SqliteConnection,
    existing: &UserRow,
    changes: UserChanges,
) -> AppResult<()> {
    if changes.is_empty() {
        return Ok(());
    }

    let email = changes.email.clone();
    let mut assignments: Vec<(UserColumn, Value)> = Vec::with_capacity(4);
    if let Some(name) = changes.name {
        assignments.push((UserColumn::Name, name.into()));
    }
    if let Some(email) = changes.email {
        assignments.push((UserColumn::Email, email.into()));
    }
    if let Some(is_active) = changes.is_active {
        assignments.push((UserColumn::IsActive, is_active.into()));
    }
    let updated_at = format_timestamp(advance_from(existing.updated_at))?;
    assignments.push((UserColumn::UpdatedAt, updated_at.into()));

    UserRow::update_columns(conn, existing.id, assignments)
        .await
        .map_err(|e| match email.as_deref() {
            Some(email) => email_conflict(e, email),
            None => e,
        })?;
    Ok(())
}

fn email_conflict(err: AppError, email: &str) -> AppError {
    if err.is_unique_violation() {
        AppError::DuplicateEmail(email.to_owned())
    } else {
        err
    }
}
