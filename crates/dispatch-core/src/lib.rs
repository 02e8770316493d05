//! Core of the order lifecycle and dispatch engine.
//!
//! The engine owns a grocery order from submission to delivery: it persists
//! orders and drives their small state machine, pushes new orders to the
//! owning store's live channels, matches ready orders to nearby drivers,
//! commits a driver's claim exactly once and completes deliveries by
//! creating the payment before the live record is removed.
//!
//! Concurrency across orders, stores and drivers rests on storage-level
//! conditional writes rather than in-process locks.

pub mod builder;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod push;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use builder::{BuilderError, DispatchBuilder, DispatchFactories};
pub use engine::{DispatchEngine, EngineError};
pub use error::DispatchError;
pub use push::{ChannelHub, PushError, PushFanout, PushTransport};
pub use state::{ConnectionRegistry, HistoryStore, OrderStore, StorageConnectionRegistry};
