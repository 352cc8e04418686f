//! Common types for the escrowed order ledger.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//! customer identities, amounts, order slots, ledger events and the
//! request/response shapes of the HTTP API.

/// Customer identity and monetary amounts.
pub mod account;
/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Events published by the ledger after each committed change.
pub mod events;
/// Order slot types and placement input validation.
pub mod order;
/// Self-registering implementation registry.
pub mod registry;
/// Storage namespaces.
pub mod storage;
/// Configuration validation types for backend sections.
pub mod validation;

pub use account::*;
pub use api::*;
pub use events::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use validation::*;
