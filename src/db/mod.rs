//! Connection pool lifecycle.
//!
//! `Database` is built once at startup and shared behind an `Arc`. It moves
//! through idle -> connected -> closed; only a connected manager hands out
//! connections.

use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};

pub mod query;
pub mod scope;

enum PoolState {
    Idle,
    Connected(SqlitePool),
    Closed,
}

pub struct Database {
    state: RwLock<PoolState>,
    in_use: Arc<AtomicUsize>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PoolState::Idle),
            in_use: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Open the bounded pool. Fails fast if a pool is already live.
    pub async fn connect(&self, config: &DatabaseConfig) -> AppResult<()> {
        let mut state = self.state.write().await;
        if matches!(*state, PoolState::Connected(_)) {
            warn!("connect called on a live pool");
            return Err(AppError::AlreadyConnected);
        }

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| {
                warn!(error = %e, url = %config.url, "failed to open database pool");
                AppError::from(e)
            })?;

        info!(
            url = %config.url,
            max_connections = config.max_connections,
            "database pool connected"
        );
        *state = PoolState::Connected(pool);
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to come back.
    /// A no-op when the pool was never connected or is already closed.
    pub async fn disconnect(&self) {
        let mut state = self.state.write().await;
        let PoolState::Connected(pool) = &*state else {
            debug!("disconnect called without a live pool");
            return;
        };
        let pool = pool.clone();
        *state = PoolState::Closed;
        drop(state);

        pool.close().await;
        info!("database pool closed");
    }

    /// Apply the bundled schema.
    pub async fn migrate(&self) -> AppResult<()> {
        let pool = self.pool().await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database schema up to date");
        Ok(())
    }

    /// Check out one connection, waiting up to the configured acquire timeout.
    pub async fn acquire(&self) -> AppResult<PooledConnection> {
        let pool = self.pool().await?;
        let conn = pool.acquire().await.map_err(|e| {
            warn!(error = %e, "failed to acquire connection");
            AppError::from(e)
        })?;
        Ok(PooledConnection::new(conn, Arc::clone(&self.in_use)))
    }

    /// Number of connections currently checked out through `acquire`.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    /// Round-trip to the store inside a read scope.
    pub async fn ping(&self) -> AppResult<()> {
        self.read_transaction(|conn| {
            Box::pin(async move {
                query::fetch_one(conn, "SELECT 1 AS ok", &[]).await?;
                Ok(())
            })
        })
        .await
    }

    async fn pool(&self) -> AppResult<SqlitePool> {
        match &*self.state.read().await {
            PoolState::Connected(pool) => Ok(pool.clone()),
            PoolState::Idle => Err(AppError::PoolUnavailable(
                "pool not initialized; call connect first",
            )),
            PoolState::Closed => Err(AppError::PoolUnavailable("pool has been disconnected")),
        }
    }
}

/// Exclusive handle to one pooled connection.
///
/// Dropping the handle returns the connection to the pool. If it is dropped
/// while a transaction is still open (the owning future was cancelled), the
/// connection is detached from the pool and closed, which rolls the
/// transaction back and releases the write lock.
pub struct PooledConnection {
    // `None` only once `drop` has taken it.
    conn: Option<PoolConnection<Sqlite>>,
    in_use: Arc<AtomicUsize>,
    in_transaction: bool,
}

impl PooledConnection {
    fn new(conn: PoolConnection<Sqlite>, in_use: Arc<AtomicUsize>) -> Self {
        in_use.fetch_add(1, Ordering::SeqCst);
        Self {
            conn: Some(conn),
            in_use,
            in_transaction: false,
        }
    }
}

impl Deref for PooledConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        self.conn.as_deref().expect("pooled connection used after drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        self.conn.as_deref_mut().expect("pooled connection used after drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.in_transaction {
                warn!("connection released with an open transaction; discarding it");
                // Closing the raw connection rolls back; the pool opens a replacement.
                drop(conn.detach());
            }
        }
        self.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}
