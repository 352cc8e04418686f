//! Core of the escrow ledger.
//!
//! This crate ties storage and fund transfers together into the
//! [`OrderLedger`], which enforces the order lifecycle: place with an exact
//! payment, then confirm to keep the funds or cancel to refund them. The
//! [`LedgerBuilder`] constructs a ledger from configuration.

pub mod builder;
pub mod engine;
pub mod state;

pub use builder::{BuilderError, LedgerBuilder, LedgerFactories};
pub use engine::event_bus::EventBus;
pub use engine::{ErrorKind, LedgerError, OrderLedger, StateConflict};
