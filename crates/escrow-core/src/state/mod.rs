//! Persistence and lifecycle rules for order slots.

pub mod order;

pub use order::{OrderStateError, OrderStateMachine};
