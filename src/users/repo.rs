use sqlx::SqliteConnection;

use crate::db::query::{self, Value};
use crate::error::AppResult;
use crate::users::repo_types::{format_timestamp, UserRow};

const SELECT_USER: &str = r#"
    SELECT id, name, email, password_hash, is_active, created_at, updated_at
    FROM users
"#;

/// Columns a partial update may touch. Only these names are ever spliced into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserColumn {
    Name,
    Email,
    IsActive,
    UpdatedAt,
}

impl UserColumn {
    fn as_sql(self) -> &'static str {
        match self {
            UserColumn::Name => "name",
            UserColumn::Email => "email",
            UserColumn::IsActive => "is_active",
            UserColumn::UpdatedAt => "updated_at",
        }
    }
}

/// Values for a fresh `users` row; the password is already hashed.
#[derive(Debug)]
pub struct InsertUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: Option<&'a str>,
    pub is_active: bool,
    pub at: time::OffsetDateTime,
}

impl UserRow {
    pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> AppResult<Option<UserRow>> {
        let sql = format!("{SELECT_USER} WHERE id = ?");
        query::fetch_one(conn, &sql, &[Value::Int(id)])
            .await?
            .map(UserRow::try_from)
            .transpose()
    }

    /// Match follows the column collation (case-insensitive).
    pub async fn find_by_email(
        conn: &mut SqliteConnection,
        email: &str,
    ) -> AppResult<Option<UserRow>> {
        let sql = format!("{SELECT_USER} WHERE email = ?");
        query::fetch_one(conn, &sql, &[email.into()])
            .await?
            .map(UserRow::try_from)
            .transpose()
    }

    /// Newest first; `id` breaks ties between identical timestamps.
    pub async fn list(
        conn: &mut SqliteConnection,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<UserRow>> {
        let sql = format!("{SELECT_USER} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");
        query::fetch_all(conn, &sql, &[Value::Int(limit), Value::Int(offset)])
            .await?
            .into_iter()
            .map(UserRow::try_from)
            .collect()
    }

    /// `pattern` is a LIKE pattern using `\` as the escape character.
    pub async fn search_by_name(
        conn: &mut SqliteConnection,
        pattern: &str,
        limit: i64,
    ) -> AppResult<Vec<UserRow>> {
        let sql = format!(
            "{SELECT_USER} WHERE name LIKE ? ESCAPE '\\' ORDER BY created_at DESC, id DESC LIMIT ?"
        );
        query::fetch_all(conn, &sql, &[pattern.into(), Value::Int(limit)])
            .await?
            .into_iter()
            .map(UserRow::try_from)
            .collect()
    }

    /// Insert and return the generated id.
    pub async fn insert(conn: &mut SqliteConnection, user: &InsertUser<'_>) -> AppResult<i64> {
        let at = format_timestamp(user.at)?;
        query::execute(
            conn,
            r#"
            INSERT INTO users (name, email, password_hash, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            &[
                user.name.into(),
                user.email.into(),
                user.password_hash.into(),
                user.is_active.into(),
                at.clone().into(),
                at.into(),
            ],
        )
        .await?;
        query::last_insert_id(conn).await
    }

    /// Set exactly the given columns; returns the affected row count.
    pub async fn update_columns(
        conn: &mut SqliteConnection,
        id: i64,
        assignments: Vec<(UserColumn, Value)>,
    ) -> AppResult<u64> {
        if assignments.is_empty() {
            return Ok(0);
        }
        let set_clause = assignments
            .iter()
            .map(|(column, _)| format!("{} = ?", column.as_sql()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE users SET {set_clause} WHERE id = ?");

        let mut params: Vec<Value> = assignments.into_iter().map(|(_, value)| value).collect();
        params.push(Value::Int(id));
        query::execute(conn, &sql, &params).await
    }

    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> AppResult<u64> {
        query::execute(conn, "DELETE FROM users WHERE id = ?", &[Value::Int(id)]).await
    }
}

/// Escape LIKE wildcards so `term` matches literally as a substring.
pub fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
