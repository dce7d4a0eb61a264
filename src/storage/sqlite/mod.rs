//! SQLite implementations of storage interfaces.
//!
//! Every unit of work runs on one pooled connection inside a
//! `BEGIN IMMEDIATE` transaction. The immediate write lock is the exclusive
//! lease behind `lock_cart`/`lock_promotion`: no other writer can interleave
//! until `COMMIT` or `ROLLBACK`.

mod carts;
mod catalog;
mod orders;
mod payments;
mod promotions;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sea_query_binder::SqlxValues;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use super::schema::CREATE_STATEMENTS;
use super::{Result, StorageError, Store, UnitOfWork};

/// How long a unit of work waits for another writer's lease.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite implementation of [`Store`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool. Call [`SqliteStore::init`] before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `uri`.
    pub async fn connect(uri: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(uri)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes.
    pub async fn init(&self) -> Result<()> {
        for statement in CREATE_STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("SQLite schema initialized");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        // BEGIN IMMEDIATE acquires the write lock upfront, preventing deadlocks
        // when concurrent DEFERRED transactions race to upgrade from shared to exclusive.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Box::new(SqliteUnitOfWork { conn: Some(conn) }))
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// Unit of work holding an open `BEGIN IMMEDIATE` transaction.
pub struct SqliteUnitOfWork {
    conn: Option<PoolConnection<Sqlite>>,
}

impl SqliteUnitOfWork {
    fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| StorageError::Corrupt("unit of work already finished".to_string()))
    }

    /// Run a built statement, returning the affected row count.
    async fn execute(&mut self, (sql, values): (String, SqlxValues)) -> Result<u64> {
        let result = sqlx::query_with(&sql, values).execute(self.conn()?).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_optional(
        &mut self,
        (sql, values): (String, SqlxValues),
    ) -> Result<Option<SqliteRow>> {
        Ok(sqlx::query_with(&sql, values).fetch_optional(self.conn()?).await?)
    }

    async fn fetch_all(&mut self, (sql, values): (String, SqlxValues)) -> Result<Vec<SqliteRow>> {
        Ok(sqlx::query_with(&sql, values).fetch_all(self.conn()?).await?)
    }

    async fn finish(&mut self, statement: &str) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Err(StorageError::Corrupt("unit of work already finished".to_string()));
        };
        match sqlx::query(statement).execute(&mut *conn).await {
            Ok(_) => Ok(()),
            Err(e) => {
                // Never hand a connection with an open transaction back to the pool.
                drop(conn.detach());
                Err(e.into())
            }
        }
    }
}

impl Drop for SqliteUnitOfWork {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("Unit of work dropped without commit; closing connection to roll back");
            drop(conn.detach());
        }
    }
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.finish("ROLLBACK").await
    }
}

// =============================================================================
// Column encoding helpers
// =============================================================================

/// Fixed-width RFC 3339 so stored timestamps compare lexically.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn opt_ts(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(ts)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}

fn opt_uuid(id: &Option<Uuid>) -> Option<String> {
    id.map(|id| id.to_string())
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(s)?)
}

fn parse_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
    s.as_deref().map(parse_uuid).transpose()
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StorageError::Corrupt(format!("{} out of range: {}", column, value)))
}

fn not_found(entity: &'static str, id: Uuid) -> StorageError {
    StorageError::NotFound {
        entity,
        id: id.to_string(),
    }
}
