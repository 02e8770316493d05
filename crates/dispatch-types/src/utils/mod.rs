//! Utility functions shared by the dispatch crates.

pub mod formatting;

pub use formatting::{round_to_cents, truncate_id};
