//! Stateless statement helpers over an acquired connection.
//!
//! Every value reaches the store as a bound `?` parameter. Rows come back as
//! [`Record`]s keyed by column name, in select order.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqliteConnection, TypeInfo, ValueRef};
use tracing::{debug, error};

use crate::error::{AppError, AppResult};

/// A single scalar as the store sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One row: field name -> value, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn int(&self, field: &str) -> AppResult<i64> {
        match self.require(field)? {
            Value::Int(v) => Ok(*v),
            other => Err(mismatch(field, "integer", other)),
        }
    }

    pub fn text(&self, field: &str) -> AppResult<String> {
        match self.require(field)? {
            Value::Text(v) => Ok(v.clone()),
            other => Err(mismatch(field, "text", other)),
        }
    }

    pub fn opt_text(&self, field: &str) -> AppResult<Option<String>> {
        match self.require(field)? {
            Value::Null => Ok(None),
            Value::Text(v) => Ok(Some(v.clone())),
            other => Err(mismatch(field, "text or null", other)),
        }
    }

    /// Booleans are stored as 0/1 integers.
    pub fn boolean(&self, field: &str) -> AppResult<bool> {
        match self.require(field)? {
            Value::Bool(v) => Ok(*v),
            Value::Int(v) => Ok(*v != 0),
            Value::Text(v) if v == "0" || v == "1" => Ok(v == "1"),
            other => Err(mismatch(field, "boolean", other)),
        }
    }

    fn require(&self, field: &str) -> AppResult<&Value> {
        self.get(field)
            .ok_or_else(|| AppError::Query(sqlx::Error::ColumnNotFound(field.to_owned())))
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

fn mismatch(field: &str, expected: &str, got: &Value) -> AppError {
    AppError::Query(sqlx::Error::ColumnDecode {
        index: field.to_owned(),
        source: format!("expected {expected}, found {got:?}").into(),
    })
}

/// Run a statement that yields no rows; returns the affected row count.
pub async fn execute(conn: &mut SqliteConnection, sql: &str, params: &[Value]) -> AppResult<u64> {
    let result = bind(sql, params)
        .execute(&mut *conn)
        .await
        .map_err(|e| failed(sql, e))?;
    debug!(sql, rows = result.rows_affected(), "executed statement");
    Ok(result.rows_affected())
}

/// At most one row, or `None` when nothing matched.
pub async fn fetch_one(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[Value],
) -> AppResult<Option<Record>> {
    let row = bind(sql, params)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| failed(sql, e))?;
    debug!(sql, found = row.is_some(), "fetched one");
    row.as_ref().map(record_from_row).transpose()
}

pub async fn fetch_all(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[Value],
) -> AppResult<Vec<Record>> {
    let rows = bind(sql, params)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| failed(sql, e))?;
    debug!(sql, rows = rows.len(), "fetched all");
    rows.iter().map(record_from_row).collect()
}

/// Id generated by the most recent insert on this connection.
pub async fn last_insert_id(conn: &mut SqliteConnection) -> AppResult<i64> {
    let id = sqlx::query_scalar::<_, i64>("SELECT last_insert_rowid()")
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

fn bind<'q>(sql: &'q str, params: &'q [Value]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params.iter().fold(sqlx::query(sql), |query, param| match param {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Blob(v) => query.bind(v.as_slice()),
    })
}

fn failed(sql: &str, e: sqlx::Error) -> AppError {
    let err = AppError::from(e);
    if err.is_unique_violation() {
        debug!(sql, error = %err, "unique constraint rejected statement");
    } else {
        error!(sql, error = %err, "statement failed");
    }
    err
}

fn record_from_row(row: &SqliteRow) -> AppResult<Record> {
    let mut fields = Vec::with_capacity(row.columns().len());
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => Value::Int(row.try_get_unchecked(index)?),
                "REAL" => Value::Float(row.try_get_unchecked(index)?),
                "BLOB" => Value::Blob(row.try_get_unchecked(index)?),
                _ => Value::Text(row.try_get_unchecked(index)?),
            }
        };
        fields.push((column.name().to_owned(), value));
    }
    Ok(Record { fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::migrated_database;

    #[tokio::test]
    async fn maps_rows_into_ordered_records() {
        let (_dir, db) = migrated_database().await;
        let records = db
            .read_transaction(|conn| {
                Box::pin(async move {
                    fetch_all(
                        conn,
                        "SELECT ? AS n, ? AS s, ? AS f, ? AS nil",
                        &[Value::Int(7), "seven".into(), Value::Float(0.5), Value::Null],
                    )
                    .await
                })
            })
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.int("n").unwrap(), 7);
        assert_eq!(record.text("s").unwrap(), "seven");
        assert_eq!(record.get("f"), Some(&Value::Float(0.5)));
        assert_eq!(record.opt_text("nil").unwrap(), None);
        assert_eq!(
            serde_json::to_string(record).unwrap(),
            r#"{"n":7,"s":"seven","f":0.5,"nil":null}"#
        );
    }

    #[tokio::test]
    async fn fetch_one_returns_none_when_nothing_matches() {
        let (_dir, db) = migrated_database().await;
        let found = db
            .read_transaction(|conn| {
                Box::pin(async move {
                    fetch_one(conn, "SELECT id FROM users WHERE id = ?", &[Value::Int(1)]).await
                })
            })
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn parameters_are_bound_not_interpolated() {
        let (_dir, db) = migrated_database().await;
        let hostile = "x'); DROP TABLE users; --";
        let echoed = db
            .read_transaction(move |conn| {
                Box::pin(async move {
                    let record = fetch_one(conn, "SELECT ? AS v", &[hostile.into()]).await?;
                    let still_there =
                        fetch_one(conn, "SELECT COUNT(*) AS n FROM users", &[]).await?;
                    Ok((record, still_there))
                })
            })
            .await
            .unwrap();
        assert_eq!(echoed.0.unwrap().text("v").unwrap(), hostile);
        assert_eq!(echoed.1.unwrap().int("n").unwrap(), 0);
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_query_error() {
        let (_dir, db) = migrated_database().await;
        let err = db
            .read_transaction(|conn| {
                Box::pin(async move { execute(conn, "SELEC nonsense", &[]).await })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Query(sqlx::Error::Database(_))));
    }

    #[test]
    fn typed_accessors_reject_mismatches() {
        let record = Record {
            fields: vec![
                ("id".into(), Value::Text("nope".into())),
                ("flag".into(), Value::Int(1)),
            ],
        };
        assert!(record.int("id").is_err());
        assert!(record.boolean("flag").unwrap());
        assert!(matches!(
            record.text("missing"),
            Err(AppError::Query(sqlx::Error::ColumnNotFound(_)))
        ));
    }
}
