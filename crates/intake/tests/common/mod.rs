//! Shared test utilities for intake integration tests.
//!
//! - `TestHarness` for an isolated inbox/outbox/failed/state layout
//! - `ConfigBuilder` for writing config files programmatically

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
