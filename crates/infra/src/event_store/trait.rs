use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use procureflow_core::{AggregateId, BusinessId, ExpectedVersion};

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Lifecycle of an event:
///
/// 1. **Domain event**: returned by an aggregate's `handle()`
/// 2. **UncommittedEvent**: serialized and wrapped with stream metadata
/// 3. **StoredEvent**: persisted with its assigned `sequence_number`
/// 4. **EventEnvelope**: published on the bus for projections
///
/// Build one with [`UncommittedEvent::from_typed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub business_id: BusinessId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A persisted event in an append-only stream.
///
/// Sequence numbers are assigned by the store on append. They start at 1,
/// are scoped to one `(business_id, aggregate_id)` stream and never change.
/// The last sequence number of a stream is its version, which is what
/// optimistic concurrency compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub business_id: BusinessId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert into a business-scoped envelope for publication.
    pub fn to_envelope(&self) -> procureflow_events::EventEnvelope<JsonValue> {
        procureflow_events::EventEnvelope::new(
            self.event_id,
            self.business_id,
            self.aggregate_id.clone(),
            self.aggregate_type.clone(),
            self.sequence_number,
            self.payload.clone(),
        )
    }
}

/// Event store operation error.
///
/// Infrastructure failures only. Domain rule violations never reach the store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("business isolation violation: {0}")]
    BusinessIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),
}

/// Append-only, business-scoped event store.
///
/// One stream per aggregate instance, keyed by `(business_id, aggregate_id)`.
/// The buyer's `PO-1` and the seller's `B2B-PO-1` therefore live in
/// different streams even though they describe the same trade.
///
/// Implementations must:
/// - reject batches that mix businesses or aggregates
/// - check `expected_version` against the current stream version under the
///   same lock that performs the append (this is the compare-and-swap every
///   read-modify-write in the system relies on)
/// - assign sequence numbers `current + 1 ..` without gaps
/// - persist a batch atomically
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream; empty when the aggregate was never created.
    fn load_stream(
        &self,
        business_id: BusinessId,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(
        &self,
        business_id: BusinessId,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(business_id, aggregate_id)
    }
}

impl UncommittedEvent {
    /// Serialize a typed domain event, capturing the metadata needed to
    /// decode it again.
    pub fn from_typed<E>(
        business_id: BusinessId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: procureflow_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            business_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}
