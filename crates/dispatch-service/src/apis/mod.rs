//! Route handlers, one module per caller.
//!
//! Handlers only translate between HTTP and engine operations; every engine
//! error becomes an [`dispatch_types::APIError`].

pub mod customers;
pub mod drivers;
pub mod orders;
pub mod socket;
