//! Logging setup shared by every process that embeds the engine.

pub mod logging;

pub use logging::{LogFormat, init, init_for_tests, try_init};
