use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use crate::errors::LookupError;

/// One cached lookup, keyed by canonical domain name. `updated_at` is stored
/// without a timezone and is interpreted as UTC when freshness is evaluated.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DomainRecord {
    pub name: String,
    pub ip: String,
    pub updated_at: NaiveDateTime,
    pub whois_raw: String,
    pub ttl_seconds: i64,
    pub hosted_at: String,
}

/// Writes staged by a single lookup. The batch is owned by the call that
/// builds it: records reach the store only when the batch is committed, and
/// a batch dropped before commit persists nothing.
#[derive(Debug, Default)]
pub struct WriteBatch {
    records: Vec<DomainRecord>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a record keyed by name, replacing any staged record with the
    /// same name.
    pub fn upsert(&mut self, record: DomainRecord) {
        if let Some(index) = self.records.iter().position(|staged| staged.name == record.name) {
            self.records[index] = record;
        } else {
            self.records.push(record);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consumes the batch, yielding the staged records in staging order.
    pub fn into_records(self) -> Vec<DomainRecord> {
        self.records
    }
}

/// Durable storage for domain records. Staging happens in a caller-owned
/// `WriteBatch`; `commit` consumes the batch and is the only operation that
/// makes writes visible.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<Option<DomainRecord>, LookupError>;

    /// Persists a batch atomically. Committing an empty batch is a no-op.
    async fn commit(&self, batch: WriteBatch) -> Result<(), LookupError>;
}

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Connects to the given SQLite URL and bootstraps the schema.
    pub async fn connect(database_url: &str) -> Result<Self, LookupError> {
        let pool = SqlitePool::connect(database_url).await?;
        Self::with_pool(pool).await
    }

    /// Wraps an existing pool, enabling WAL and creating the table if needed.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, LookupError> {
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS domain_records (
                name TEXT PRIMARY KEY,
                ip TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                whois_raw TEXT NOT NULL,
                ttl_seconds INTEGER NOT NULL,
                hosted_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get_by_name(&self, name: &str) -> Result<Option<DomainRecord>, LookupError> {
        let record = sqlx::query_as::<_, DomainRecord>(
            "SELECT name, ip, updated_at, whois_raw, ttl_seconds, hosted_at
             FROM domain_records WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), LookupError> {
        if batch.is_empty() {
            return Ok(());
        }

        let records = batch.into_records();
        debug!(records = records.len(), "committing staged domain records");

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                "INSERT INTO domain_records (name, ip, updated_at, whois_raw, ttl_seconds, hosted_at)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(name) DO UPDATE SET
                    ip = excluded.ip,
                    updated_at = excluded.updated_at,
                    whois_raw = excluded.whois_raw,
                    ttl_seconds = excluded.ttl_seconds,
                    hosted_at = excluded.hosted_at",
            )
            .bind(&record.name)
            .bind(&record.ip)
            .bind(record.updated_at)
            .bind(&record.whois_raw)
            .bind(record.ttl_seconds)
            .bind(&record.hosted_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}
