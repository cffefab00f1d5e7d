//! Core data model.
//!
//! A work record is a persisted unit of pending work. It has identity,
//! a category (which selects the handler), an opaque payload, and a
//! three-state lifecycle: pending, done, or failed for good.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Work Record
// ---------------------------------------------------------------------------

/// A unit of work tracked by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRecord {
    /// Unique identifier. Producers may assign their own (idempotency
    /// contract); the engine mints one otherwise.
    pub id: RecordId,

    /// What kind of work this is (e.g., "bank-statement", "product").
    /// Determines which handler executes it; batches are read per category.
    pub category: String,

    /// The data to process. Opaque to the engine — only the handler
    /// interprets it.
    pub payload: String,

    /// Current lifecycle status.
    pub status: Status,

    /// Diagnostic text, set only when the record fails.
    pub error_info: Option<String>,

    /// Handler output captured on finalization.
    pub response_info: Option<String>,

    /// Batches are read oldest-first within a category.
    pub created_at: DateTime<Utc>,

    /// Set when the record reaches `Processed`.
    pub processed_at: Option<DateTime<Utc>>,
}

/// Newtype for work record IDs. Opaque strings, so producers can use
/// whatever identity scheme they already have.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    /// Mint a fresh id for producers that don't bring their own.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a work record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Persisted and eligible for pickup.
    Initial,
    /// Done successfully. Terminal.
    Processed,
    /// Execution failed. Terminal — never retried automatically.
    Error,
}

impl Status {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!((self, to), (Initial, Processed) | (Initial, Error))
    }

    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Processed | Status::Error)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Initial => "initial",
            Status::Processed => "processed",
            Status::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(Status::Initial),
            "processed" => Ok(Status::Processed),
            "error" => Ok(Status::Error),
            _ => Err(crate::error::Error::Other(format!("unknown status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for creating new work records. The engine's public API for
/// submitting work.
pub struct NewWorkRecord {
    pub(crate) id: Option<RecordId>,
    pub(crate) category: String,
    pub(crate) payload: String,
    pub(crate) quiet: bool,
}

impl NewWorkRecord {
    pub fn new(category: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: None,
            category: category.into(),
            payload: payload.into(),
            quiet: false,
        }
    }

    /// Use a producer-assigned id instead of a generated one.
    pub fn id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Persist without waking the coordinator; the record is picked up at
    /// the next poll tick.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn into_record(self) -> WorkRecord {
        WorkRecord {
            id: self.id.unwrap_or_else(RecordId::generate),
            category: self.category,
            payload: self.payload,
            status: Status::Initial,
            error_info: None,
            response_info: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_transitions_to_both_terminals() {
        assert!(Status::Initial.can_transition_to(Status::Processed));
        assert!(Status::Initial.can_transition_to(Status::Error));
    }

    #[test]
    fn terminal_statuses_never_transition() {
        for from in [Status::Processed, Status::Error] {
            for to in [Status::Initial, Status::Processed, Status::Error] {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn status_display_round_trips() {
        for status in [Status::Initial, Status::Processed, Status::Error] {
            let parsed: Status = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn builder_defaults() {
        let record = NewWorkRecord::new("product", "{}").into_record();
        assert_eq!(record.status, Status::Initial);
        assert!(record.error_info.is_none());
        assert!(record.processed_at.is_none());
        assert!(!record.id.as_str().is_empty());
    }

    #[test]
    fn builder_keeps_producer_id() {
        let record = NewWorkRecord::new("product", "{}").id("order-42").into_record();
        assert_eq!(record.id.as_str(), "order-42");
    }
}
