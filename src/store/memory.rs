//! In-process store, for tests and development.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{StatusCount, WorkStore};
use crate::error::{Error, Result};
use crate::model::{RecordId, Status, WorkRecord};

/// Mutexed map keyed by record id. Insertion order is kept as a sequence
/// number so batches have a stable tiebreak when timestamps collide.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, (u64, WorkRecord)>,
    next_seq: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl WorkStore for MemoryStore {
    async fn insert(&self, record: &WorkRecord) -> Result<bool> {
        let mut inner = self.lock();
        if inner.records.contains_key(record.id.as_str()) {
            return Ok(false);
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .records
            .insert(record.id.as_str().to_string(), (seq, record.clone()));
        Ok(true)
    }

    async fn get(&self, id: &RecordId) -> Result<Option<WorkRecord>> {
        Ok(self.lock().records.get(id.as_str()).map(|(_, r)| r.clone()))
    }

    async fn pending_categories(&self) -> Result<Vec<String>> {
        let inner = self.lock();
        let mut categories: Vec<String> = inner
            .records
            .values()
            .filter(|(_, r)| r.status == Status::Initial)
            .map(|(_, r)| r.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn pending_batch(&self, category: &str, limit: usize) -> Result<Vec<WorkRecord>> {
        let inner = self.lock();
        let mut batch: Vec<(u64, WorkRecord)> = inner
            .records
            .values()
            .filter(|(_, r)| r.status == Status::Initial && r.category == category)
            .cloned()
            .collect();
        batch.sort_by(|(seq_a, a), (seq_b, b)| {
            a.created_at.cmp(&b.created_at).then(seq_a.cmp(seq_b))
        });
        batch.truncate(limit);
        Ok(batch.into_iter().map(|(_, r)| r).collect())
    }

    async fn mark_processed(&self, id: &RecordId, response: Option<String>) -> Result<()> {
        let mut inner = self.lock();
        let (_, record) = inner
            .records
            .get_mut(id.as_str())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if !record.status.can_transition_to(Status::Processed) {
            // Already terminal: re-finalizing is a no-op.
            return Ok(());
        }
        record.status = Status::Processed;
        record.processed_at = Some(Utc::now());
        record.response_info = response;
        Ok(())
    }

    async fn mark_error(
        &self,
        id: &RecordId,
        error: &str,
        response: Option<String>,
    ) -> Result<()> {
        let mut inner = self.lock();
        let (_, record) = inner
            .records
            .get_mut(id.as_str())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if !record.status.can_transition_to(Status::Error) {
            return Ok(());
        }
        record.status = Status::Error;
        record.error_info = Some(error.to_string());
        record.response_info = response;
        Ok(())
    }

    async fn list(
        &self,
        status: Option<Status>,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<WorkRecord>> {
        let inner = self.lock();
        let mut records: Vec<(u64, WorkRecord)> = inner
            .records
            .values()
            .filter(|(_, r)| status.is_none_or(|s| r.status == s))
            .filter(|(_, r)| category.is_none_or(|c| r.category == c))
            .cloned()
            .collect();
        records.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });
        records.truncate(limit);
        Ok(records.into_iter().map(|(_, r)| r).collect())
    }

    async fn counts(&self) -> Result<Vec<StatusCount>> {
        let inner = self.lock();
        let mut tally: HashMap<(String, Status), u64> = HashMap::new();
        for (_, record) in inner.records.values() {
            *tally
                .entry((record.category.clone(), record.status))
                .or_default() += 1;
        }
        let mut counts: Vec<StatusCount> = tally
            .into_iter()
            .map(|((category, status), count)| StatusCount {
                category,
                status,
                count,
            })
            .collect();
        counts.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then(a.status.to_string().cmp(&b.status.to_string()))
        });
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewWorkRecord;

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = MemoryStore::new();
        let record = NewWorkRecord::new("product", "a").id("r1").into_record();

        assert!(store.insert(&record).await.unwrap());
        assert!(!store.insert(&record).await.unwrap());
    }

    #[tokio::test]
    async fn pending_batch_is_oldest_first() {
        let store = MemoryStore::new();
        for n in 0..3 {
            let record = NewWorkRecord::new("product", "x")
                .id(format!("r{n}"))
                .into_record();
            store.insert(&record).await.unwrap();
        }

        let batch = store.pending_batch("product", 10).await.unwrap();
        let ids: Vec<&str> = batch.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["r0", "r1", "r2"]);
    }

    #[tokio::test]
    async fn terminal_records_are_immutable() {
        let store = MemoryStore::new();
        let record = NewWorkRecord::new("product", "x").id("r1").into_record();
        store.insert(&record).await.unwrap();

        store
            .mark_processed(&record.id, Some("done".to_string()))
            .await
            .unwrap();

        // Re-finalizing is a no-op, not an error.
        store.mark_error(&record.id, "late failure", None).await.unwrap();

        let stored = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, Status::Processed);
        assert!(stored.error_info.is_none());
        assert_eq!(stored.response_info.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn mark_on_missing_record_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .mark_processed(&RecordId::from("nope"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn pending_categories_are_distinct_and_sorted() {
        let store = MemoryStore::new();
        for (id, category) in [("a", "orders"), ("b", "bins"), ("c", "orders")] {
            let record = NewWorkRecord::new(category, "x").id(id).into_record();
            store.insert(&record).await.unwrap();
        }
        store.mark_processed(&RecordId::from("b"), None).await.unwrap();

        let categories = store.pending_categories().await.unwrap();
        assert_eq!(categories, ["orders"]);
    }
}
