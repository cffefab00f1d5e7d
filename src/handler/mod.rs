//! Handler trait and registry.
//!
//! A handler is the pluggable business logic for one category of work
//! records. The registry maps category strings to handler instances,
//! populated by explicit registration at startup.

pub mod command;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::{Error, Result};
use crate::model::WorkRecord;

/// What a handler returns when asked to execute a record.
pub enum Execution {
    /// The work is done; the worker finalizes the record in the same call
    /// stack. The payload is captured into `response_info`.
    Completed(Option<String>),

    /// The real work continues elsewhere (an external asynchronous
    /// service). The worker slot is released immediately and a continuation
    /// finalizes the record when the future resolves.
    Detached(BoxFuture<'static, Result<Option<String>>>),
}

/// A handler for a specific work category.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Derive the duplicate-suppression key for a record, if any. Records
    /// sharing a (category, key) are never dispatched concurrently within a
    /// cycle. A derivation failure marks the record as failed without
    /// disturbing the rest of the cycle.
    fn dedup_key(&self, _record: &WorkRecord) -> Result<Option<String>> {
        Ok(None)
    }

    /// Execute one record.
    async fn execute(&self, record: &WorkRecord) -> Result<Execution>;
}

/// Registry of handlers (category -> handler).
///
/// Built during initialization (mutable), used during runtime (immutable
/// behind an Arc). This avoids locks on the dispatch path.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
    order: Vec<String>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a category. Registering a category twice is
    /// an error — pick one handler per category at the composition root.
    pub fn register(
        &mut self,
        category: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<()> {
        let category = category.into();
        if self.handlers.contains_key(&category) {
            return Err(Error::DuplicateHandler(category));
        }
        self.order.push(category.clone());
        self.handlers.insert(category, handler);
        Ok(())
    }

    pub fn get(&self, category: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(category).cloned()
    }

    /// Registered categories, in registration order.
    pub fn categories(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewWorkRecord;

    struct OkHandler;

    #[async_trait]
    impl Handler for OkHandler {
        async fn execute(&self, _record: &WorkRecord) -> Result<Execution> {
            Ok(Execution::Completed(None))
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry.register("product", Arc::new(OkHandler)).unwrap();

        let err = registry.register("product", Arc::new(OkHandler)).unwrap_err();
        assert!(matches!(err, Error::DuplicateHandler(c) if c == "product"));
    }

    #[test]
    fn categories_keep_registration_order() {
        let mut registry = HandlerRegistry::new();
        registry.register("zebra", Arc::new(OkHandler)).unwrap();
        registry.register("apple", Arc::new(OkHandler)).unwrap();

        assert_eq!(registry.categories(), ["zebra", "apple"]);
    }

    #[tokio::test]
    async fn default_dedup_key_is_none() {
        let handler = OkHandler;
        let record = NewWorkRecord::new("product", "{}").into_record();
        assert!(handler.dedup_key(&record).unwrap().is_none());
    }
}
