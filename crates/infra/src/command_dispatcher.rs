//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (business-scoped)
//!   ↓
//! 2. Rehydrate aggregate
//!   ↓
//! 3. Handle command (pure decision, produces events)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 5. Publish committed envelopes
//! ```
//!
//! Step 4 is the compare-and-swap: if another writer appended to the same
//! stream between load and append, the dispatch fails with
//! `DispatchError::Concurrency` and nothing is published. Callers that need
//! to land a command under contention (budget commits) reload and retry.
//!
//! This module contains no IO itself; it composes the store and bus traits.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use procureflow_core::{Aggregate, AggregateId, BusinessId, DomainError, ExpectedVersion};
use procureflow_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale aggregate version).
    Concurrency(String),
    /// Cross-business or cross-aggregate stream mixing.
    BusinessIsolation(String),
    /// Domain validation failure (deterministic).
    Validation(String),
    /// Domain invariant failure (deterministic).
    InvariantViolation(String),
    /// Requested status is not a successor of the current one.
    InvalidTransition { from: String, to: String },
    /// Receiving session cannot be finalized.
    IncompleteReceiving(String),
    /// Actor lacks the authority for the command.
    Unauthorized(String),
    /// Domain-level not found.
    NotFound,
    /// Historical payloads did not decode into the aggregate event type.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::BusinessIsolation(msg) => {
                DispatchError::BusinessIsolation(msg.clone())
            }
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::InvalidTransition { from, to } => {
                DispatchError::InvalidTransition { from, to }
            }
            DomainError::IncompleteReceiving(msg) => DispatchError::IncompleteReceiving(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized(msg) => DispatchError::Unauthorized(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Every aggregate in the system (orders, seller requests, budget
/// envelopes, stock items, partners, the purchasing ledger) is written
/// through this one pipeline, so business isolation and optimistic
/// concurrency are enforced in a single place.
///
/// If publication fails after a successful append, the error is returned;
/// the events are persisted and projections catch up on redelivery.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full pipeline.
    ///
    /// Returns the committed events; empty when the aggregate decided there
    /// was nothing to do (idempotent repeat).
    pub fn dispatch<A>(
        &self,
        business_id: BusinessId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(BusinessId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: procureflow_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history (business-scoped)
        let history = self.store.load_stream(business_id, &aggregate_id)?;
        validate_loaded_stream(business_id, &aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate
        let mut aggregate = make_aggregate(business_id, aggregate_id.clone());
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    business_id,
                    aggregate_id.clone(),
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Rehydrate an aggregate without issuing a command.
    ///
    /// A stream with no events yields the empty aggregate; callers check
    /// the aggregate's own "created" flag.
    pub fn load<A>(
        &self,
        business_id: BusinessId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(BusinessId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(business_id, &aggregate_id)?;
        validate_loaded_stream(business_id, &aggregate_id, &history)?;

        let mut aggregate = make_aggregate(business_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

/// Decode committed payloads back into the aggregate's typed events.
pub fn decode_committed<E>(committed: &[StoredEvent]) -> Result<Vec<E>, DispatchError>
where
    E: DeserializeOwned,
{
    committed
        .iter()
        .map(|stored| {
            serde_json::from_value(stored.payload.clone())
                .map_err(|e| DispatchError::Deserialize(e.to_string()))
        })
        .collect()
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    business_id: BusinessId,
    aggregate_id: &AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.business_id != business_id {
            return Err(DispatchError::BusinessIsolation(format!(
                "loaded stream contains wrong business_id at index {idx}"
            )));
        }
        if &e.aggregate_id != aggregate_id {
            return Err(DispatchError::BusinessIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
