//! Common types for the order dispatch system.
//!
//! This crate holds the domain model shared by every other dispatch crate:
//! orders and their lifecycle states, push channel records, coordinates,
//! push events, HTTP request/response bodies, storage namespaces and the
//! configuration schema helpers used by pluggable implementations.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Push channel registration records.
pub mod connection;
/// Events pushed to store channels and requests received from them.
pub mod events;
/// Coordinates and great-circle distance.
pub mod geo;
/// Orders, line items and order status.
pub mod order;
/// Implementation registry trait shared by pluggable components.
pub mod registry;
/// Storage namespaces.
pub mod storage;
/// Utility functions for formatting.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use api::*;
pub use connection::*;
pub use events::*;
pub use geo::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use utils::{round_to_cents, truncate_id};
pub use validation::*;
