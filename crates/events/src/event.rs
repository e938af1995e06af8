use chrono::{DateTime, Utc};

/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - designed to be **append-only**
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "purchasing.order.submitted").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time, as reported by the acting party).
    ///
    /// Buyer and seller clocks may be skewed; ordering within a stream comes
    /// from the sequence number, never from this timestamp.
    fn occurred_at(&self) -> DateTime<Utc>;
}
