//! Infrastructure layer: event store, command dispatch, read models and the
//! procurement engine that composes them.
//!
//! Everything here runs in process. Storage is behind [`event_store::EventStore`]
//! and distribution behind `procureflow_events::EventBus`, so durable
//! backends can be slotted in without touching the domain crates.

pub mod budget_ledger;
pub mod command_dispatcher;
pub mod config;
pub mod engine;
pub mod event_store;
pub mod in_flight;
pub mod projections;
pub mod read_model;
pub mod services;
pub mod workers;

pub use budget_ledger::BudgetLedger;
pub use config::EngineConfig;
pub use engine::{
    EngineError, EngineResult, EngineServices, InMemoryEngine, NewItem, NewPartner,
    OrderStatusChanged, ProcurementEngine, StatusChange, SubmitOutcome,
};

#[cfg(test)]
mod integration_tests;
