use chrono::{DateTime, Utc};

/// A published fact.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution for external listeners)
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "ledger.entry.changed").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the underlying change happened (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
