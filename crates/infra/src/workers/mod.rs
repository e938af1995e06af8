//! Background workers draining bus subscriptions into read models.

pub mod projection_worker;

pub use projection_worker::{ProjectionWorker, WorkerHandle};
