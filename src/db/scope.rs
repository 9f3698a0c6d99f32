//! Unit-of-work scopes: one connection, one transaction, one logical operation.

use futures::future::BoxFuture;
use sqlx::{Executor, SqliteConnection};
use tracing::error;

use super::{Database, PooledConnection};
use crate::error::AppResult;

/// Takes the write lock up front so concurrent writers queue instead of
/// failing on lock upgrade.
const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";
const BEGIN_READ: &str = "BEGIN";

impl Database {
    /// Run `work` inside a write transaction.
    ///
    /// Commits when `work` returns `Ok`, rolls back and returns the original
    /// error otherwise. The connection goes back to the pool on every path,
    /// including cancellation of the returned future.
    pub async fn transaction<T, F>(&self, work: F) -> AppResult<T>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, AppResult<T>> + Send,
        T: Send,
    {
        self.run_scope(BEGIN_WRITE, work).await
    }

    /// Same contract as [`Database::transaction`] with a deferred (read) transaction.
    pub async fn read_transaction<T, F>(&self, work: F) -> AppResult<T>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, AppResult<T>> + Send,
        T: Send,
    {
        self.run_scope(BEGIN_READ, work).await
    }

    async fn run_scope<T, F>(&self, begin: &'static str, work: F) -> AppResult<T>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, AppResult<T>> + Send,
        T: Send,
    {
        let mut conn = self.acquire().await?;
        conn.begin(begin).await?;

        match work(&mut *conn).await {
            Ok(value) => match conn.commit().await {
                Ok(()) => Ok(value),
                Err(e) => {
                    error!(error = %e, "commit failed; rolling back");
                    conn.rollback().await;
                    Err(e)
                }
            },
            Err(e) => {
                conn.rollback().await;
                Err(e)
            }
        }
    }
}

impl PooledConnection {
    async fn begin(&mut self, sql: &'static str) -> AppResult<()> {
        // Flag first: a cancelled BEGIN may still have run on the connection.
        self.in_transaction = true;
        if let Err(e) = (&mut **self).execute(sql).await {
            self.in_transaction = false;
            return Err(e.into());
        }
        Ok(())
    }

    async fn commit(&mut self) -> AppResult<()> {
        (&mut **self).execute("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    /// Failures are logged; the caller's error is what gets reported.
    async fn rollback(&mut self) {
        match (&mut **self).execute("ROLLBACK").await {
            Ok(_) => self.in_transaction = false,
            Err(e) => error!(error = %e, "rollback failed; connection will be discarded"),
        }
    }
}
