//! Persistence collaborator seam.
//!
//! The engine never talks to a database directly; it goes through
//! [`WorkStore`]. Every trait method is an independent unit of work — in
//! particular `mark_error`, so a failure report survives no matter what
//! happened to the transaction that produced the failure.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::model::{RecordId, Status, WorkRecord};

/// Per-(category, status) record count, for the operator surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub category: String,
    pub status: Status,
    pub count: u64,
}

/// The persisted work-record table, as the engine sees it.
///
/// Finalization contract: once a record is terminal it is immutable.
/// `mark_processed` / `mark_error` on an already-terminal record are silent
/// no-ops; on a missing record they return `Error::NotFound`.
#[async_trait]
pub trait WorkStore: Send + Sync {
    /// Persist a new record. Returns false when a record with the same id
    /// already exists (the idempotent-producer contract) — conflict-safe
    /// under concurrent producers.
    async fn insert(&self, record: &WorkRecord) -> Result<bool>;

    async fn get(&self, id: &RecordId) -> Result<Option<WorkRecord>>;

    /// Distinct categories that currently have pending records, sorted.
    async fn pending_categories(&self) -> Result<Vec<String>>;

    /// Pending records of one category, oldest first, bounded.
    async fn pending_batch(&self, category: &str, limit: usize) -> Result<Vec<WorkRecord>>;

    /// Initial -> Processed, stamping `processed_at` and the response.
    async fn mark_processed(&self, id: &RecordId, response: Option<String>) -> Result<()>;

    /// Initial -> Error, capturing diagnostic text. Runs as its own unit of
    /// work regardless of any caller context.
    async fn mark_error(
        &self,
        id: &RecordId,
        error: &str,
        response: Option<String>,
    ) -> Result<()>;

    /// Operator listing with optional filters, newest first.
    async fn list(
        &self,
        status: Option<Status>,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<WorkRecord>>;

    /// Record counts grouped by category and status.
    async fn counts(&self) -> Result<Vec<StatusCount>>;
}
