//! Tracing initialization and record execution spans.

use tracing::Span;

use crate::error::{Error, Result};
use crate::model::RecordId;

/// Initialize the tracing subscriber with an env-filter and a fmt layer.
///
/// `RUST_LOG` wins when set; `default_level` applies otherwise.
///
/// # Errors
///
/// Returns an error if a subscriber was already installed.
pub fn init_telemetry(default_level: &str) -> Result<()> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))
}

/// Start a span for work record execution.
///
/// The `record.status` field is declared empty and updated via
/// [`record_status_transition`].
pub fn start_record_span(category: &str, id: &RecordId) -> Span {
    tracing::info_span!(
        "record.execute",
        "record.category" = category,
        "record.id" = %id,
        "record.status" = tracing::field::Empty,
    )
}

/// Record a status transition event on the given span.
pub fn record_status_transition(span: &Span, from: &str, to: &str) {
    span.record("record.status", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "status_transition");
    });
}
