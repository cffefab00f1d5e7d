//! Postgres-backed store.
//!
//! Connection pool, embedded migrations, and the conflict-safe queries the
//! engine contract requires: `ON CONFLICT DO NOTHING` inserts and
//! status-guarded finalization updates so a lost race degrades to a no-op
//! instead of a double write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{StatusCount, WorkStore};
use crate::error::{Error, Result};
use crate::model::{RecordId, Status, WorkRecord};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Simple health check — run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Shared finalization guard: an UPDATE touching zero rows means the
    /// record is either gone (an error) or already terminal (a no-op).
    async fn check_unmodified(&self, id: &RecordId) -> Result<()> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT status FROM work_records WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        match existing {
            None => Err(Error::NotFound(id.to_string())),
            Some(_) => Ok(()), // already terminal — idempotent finalize
        }
    }
}

#[async_trait]
impl WorkStore for PgStore {
    async fn insert(&self, record: &WorkRecord) -> Result<bool> {
        let inserted = sqlx::query(
            "INSERT INTO work_records (id, category, payload, status, error_info, response_info, created_at, processed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(record.id.as_str())
        .bind(&record.category)
        .bind(&record.payload)
        .bind(record.status.to_string())
        .bind(&record.error_info)
        .bind(&record.response_info)
        .bind(record.created_at)
        .bind(record.processed_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(inserted == 1)
    }

    async fn get(&self, id: &RecordId) -> Result<Option<WorkRecord>> {
        let row: Option<WorkRecordRow> = sqlx::query_as(
            "SELECT id, category, payload, status, error_info, response_info, created_at, processed_at
             FROM work_records WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkRecordRow::try_into_record).transpose()
    }

    async fn pending_categories(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT category FROM work_records WHERE status = 'initial' ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    async fn pending_batch(&self, category: &str, limit: usize) -> Result<Vec<WorkRecord>> {
        let rows: Vec<WorkRecordRow> = sqlx::query_as(
            "SELECT id, category, payload, status, error_info, response_info, created_at, processed_at
             FROM work_records
             WHERE status = 'initial' AND category = $1
             ORDER BY created_at ASC, id ASC
             LIMIT $2",
        )
        .bind(category)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkRecordRow::try_into_record).collect()
    }

    async fn mark_processed(&self, id: &RecordId, response: Option<String>) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE work_records SET status = 'processed', processed_at = $1, response_info = $2
             WHERE id = $3 AND status = 'initial'",
        )
        .bind(Utc::now())
        .bind(&response)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return self.check_unmodified(id).await;
        }
        Ok(())
    }

    async fn mark_error(
        &self,
        id: &RecordId,
        error: &str,
        response: Option<String>,
    ) -> Result<()> {
        // Single auto-committed statement: the independent error write.
        let rows_affected = sqlx::query(
            "UPDATE work_records SET status = 'error', error_info = $1, response_info = $2
             WHERE id = $3 AND status = 'initial'",
        )
        .bind(error)
        .bind(&response)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return self.check_unmodified(id).await;
        }
        Ok(())
    }

    async fn list(
        &self,
        status: Option<Status>,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<WorkRecord>> {
        let mut builder: sqlx::QueryBuilder<'_, sqlx::Postgres> = sqlx::QueryBuilder::new(
            "SELECT id, category, payload, status, error_info, response_info, created_at, processed_at
             FROM work_records WHERE TRUE",
        );
        if let Some(status) = status {
            builder.push(" AND status = ").push_bind(status.to_string());
        }
        if let Some(category) = category {
            builder.push(" AND category = ").push_bind(category.to_string());
        }
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ").push_bind(limit as i64);

        let rows: Vec<WorkRecordRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(WorkRecordRow::try_into_record).collect()
    }

    async fn counts(&self) -> Result<Vec<StatusCount>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT category, status, COUNT(*) FROM work_records GROUP BY category, status ORDER BY category, status",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(category, status, count)| {
                Ok(StatusCount {
                    category,
                    status: status.parse()?,
                    count: count as u64,
                })
            })
            .collect()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct WorkRecordRow {
    id: String,
    category: String,
    payload: String,
    status: String,
    error_info: Option<String>,
    response_info: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl WorkRecordRow {
    fn try_into_record(self) -> Result<WorkRecord> {
        Ok(WorkRecord {
            id: RecordId(self.id),
            category: self.category,
            payload: self.payload,
            status: self.status.parse()?,
            error_info: self.error_info,
            response_info: self.response_info,
            created_at: self.created_at,
            processed_at: self.processed_at,
        })
    }
}
