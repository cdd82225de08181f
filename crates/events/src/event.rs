use chrono::{DateTime, Utc};

/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts that already happened)
/// - **versioned** (schema evolution of the payload sent to downstream bridges)
/// - published only **after** the state change they describe was committed
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "warehouse.order.placed").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (commit time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
