//! Durable request storage
//!
//! The `requests` table is the single source of truth for every submitted
//! URL. Creation, status writes, and claims are each one SQL statement, so a
//! crash never leaves a row half-written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inforobot_common::types::{IndexId, RequestStatus};
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use super::models::{ClaimOutcome, IndexEntry, Request};

/// How many fresh identifiers `create` tries before giving up
pub const MAX_INDEX_ID_ATTEMPTS: usize = 5;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Request '{0}' not found")]
    NotFound(String),

    #[error("Could not allocate a unique index id after {0} attempts")]
    IdSpaceExhausted(usize),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Corrupt request row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence seam for request records
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Insert a PENDING request under a freshly generated, unique index id
    async fn create(&self, url: &str) -> StoreResult<Request>;

    async fn get(&self, index_id: &str) -> StoreResult<Request>;

    /// PENDING, FAILED, and lease-expired PROCESSING rows, oldest first
    async fn list_unfinished(&self) -> StoreResult<Vec<Request>>;

    /// Overwrite status and content together and release any claim
    async fn update_status(
        &self,
        index_id: &str,
        status: RequestStatus,
        content: &str,
    ) -> StoreResult<()>;

    /// Move a non-complete request to PROCESSING unless another lease is live
    async fn claim(&self, index_id: &str, lease: Duration) -> StoreResult<ClaimOutcome>;

    /// Drop the lease on a PROCESSING row so the next delivery can claim it
    async fn release(&self, index_id: &str) -> StoreResult<()>;

    /// Replace content, optionally setting a new status
    async fn update_content(
        &self,
        index_id: &str,
        content: &str,
        status: Option<RequestStatus>,
    ) -> StoreResult<Request>;

    async fn delete(&self, index_id: &str) -> StoreResult<()>;

    async fn list_index(&self) -> StoreResult<Vec<IndexEntry>>;
}

#[derive(Debug, sqlx::FromRow)]
struct RequestRow {
    id: i64,
    index_id: String,
    url: String,
    content: Option<String>,
    status: i16,
    claimed_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for Request {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let status = RequestStatus::from_code(row.status)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", row.index_id, e)))?;

        Ok(Request {
            id: row.id,
            index_id: row.index_id,
            url: row.url,
            content: row.content,
            status,
            claimed_until: row.claimed_until,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const REQUEST_COLUMNS: &str =
    "id, index_id, url, content, status, claimed_until, created_at, updated_at";

/// PostgreSQL-backed request store
#[derive(Clone)]
pub struct PgRequestStore {
    pool: PgPool,
}

impl PgRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequestStore for PgRequestStore {
    #[tracing::instrument(skip(self))]
    async fn create(&self, url: &str) -> StoreResult<Request> {
        let sql = format!(
            "INSERT INTO requests (index_id, url, status) VALUES ($1, $2, $3) \
             ON CONFLICT (index_id) DO NOTHING RETURNING {REQUEST_COLUMNS}"
        );

        for attempt in 1..=MAX_INDEX_ID_ATTEMPTS {
            let index_id = IndexId::generate();
            let row = sqlx::query_as::<_, RequestRow>(&sql)
                .bind(index_id.as_str())
                .bind(url)
                .bind(RequestStatus::Pending.code())
                .fetch_optional(&self.pool)
                .await?;

            match row {
                Some(row) => return row.try_into(),
                None => warn!(attempt, %index_id, "Index id collision, regenerating"),
            }
        }

        Err(StoreError::IdSpaceExhausted(MAX_INDEX_ID_ATTEMPTS))
    }

    async fn get(&self, index_id: &str) -> StoreResult<Request> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE index_id = $1");
        sqlx::query_as::<_, RequestRow>(&sql)
            .bind(index_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(index_id.to_string()))?
            .try_into()
    }

    async fn list_unfinished(&self) -> StoreResult<Vec<Request>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM requests \
             WHERE status IN ($1, $2) \
                OR (status = $3 AND (claimed_until IS NULL OR claimed_until < NOW())) \
             ORDER BY id ASC"
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(RequestStatus::Pending.code())
            .bind(RequestStatus::Failed.code())
            .bind(RequestStatus::Processing.code())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Request::try_from).collect()
    }

    #[tracing::instrument(skip(self, content), fields(content_len = content.len()))]
    async fn update_status(
        &self,
        index_id: &str,
        status: RequestStatus,
        content: &str,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE requests
            SET status = $1, content = $2, claimed_until = NULL, updated_at = NOW()
            WHERE index_id = $3
            "#,
        )
        .bind(status.code())
        .bind(content)
        .bind(index_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(index_id.to_string()));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn claim(&self, index_id: &str, lease: Duration) -> StoreResult<ClaimOutcome> {
        let claimed: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE requests
            SET status = $2,
                claimed_until = NOW() + make_interval(secs => $3),
                updated_at = NOW()
            WHERE index_id = $1
              AND status <> $4
              AND (status <> $2 OR claimed_until IS NULL OR claimed_until < NOW())
            RETURNING id
            "#,
        )
        .bind(index_id)
        .bind(RequestStatus::Processing.code())
        .bind(lease.as_secs_f64())
        .bind(RequestStatus::Complete.code())
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_some() {
            return Ok(ClaimOutcome::Claimed);
        }

        let current: Option<i16> =
            sqlx::query_scalar("SELECT status FROM requests WHERE index_id = $1")
                .bind(index_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match current {
            None => ClaimOutcome::Missing,
            Some(code) if code == RequestStatus::Complete.code() => ClaimOutcome::AlreadyComplete,
            Some(_) => ClaimOutcome::Busy,
        })
    }

    async fn release(&self, index_id: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE requests SET claimed_until = NULL, updated_at = NOW() \
             WHERE index_id = $1 AND status = $2",
        )
        .bind(index_id)
        .bind(RequestStatus::Processing.code())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_content(
        &self,
        index_id: &str,
        content: &str,
        status: Option<RequestStatus>,
    ) -> StoreResult<Request> {
        let sql = format!(
            "UPDATE requests \
             SET content = $1, status = COALESCE($2, status), claimed_until = NULL, updated_at = NOW() \
             WHERE index_id = $3 RETURNING {REQUEST_COLUMNS}"
        );
        sqlx::query_as::<_, RequestRow>(&sql)
            .bind(content)
            .bind(status.map(RequestStatus::code))
            .bind(index_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(index_id.to_string()))?
            .try_into()
    }

    async fn delete(&self, index_id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM requests WHERE index_id = $1")
            .bind(index_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(index_id.to_string()));
        }
        Ok(())
    }

    async fn list_index(&self) -> StoreResult<Vec<IndexEntry>> {
        let entries = sqlx::query_as::<_, IndexEntry>(
            "SELECT index_id, url AS address FROM requests ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
