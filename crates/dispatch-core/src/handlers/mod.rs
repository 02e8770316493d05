//! Handlers for the engine's operations.
//!
//! Each handler owns one area of the order lifecycle: store-side creation
//! and transitions, nearby matching for drivers, the delivery commit
//! protocol, and read-only customer and driver views.

pub mod delivery;
pub mod geomatch;
pub mod order;
pub mod queries;

pub use delivery::{normalize_price, DeliveryHandler};
pub use geomatch::GeomatchHandler;
pub use order::OrderHandler;
pub use queries::QueryHandler;
