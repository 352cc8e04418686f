//! Event types published by the ledger.
//!
//! Events are emitted only after a change has been committed to storage, so
//! a subscriber never observes a transition that was later rolled back.

use crate::{Amount, CustomerId, Order};
use serde::{Deserialize, Serialize};

/// Main event type for ledger state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
	/// A new order was placed and its payment taken into custody.
	OrderPlaced {
		customer: CustomerId,
		order: Order,
		amount: Amount,
	},
	/// An order was confirmed; its funds stay with the ledger.
	OrderConfirmed { customer: CustomerId, order: Order },
	/// An order was cancelled and its funds refunded.
	OrderCancelled {
		customer: CustomerId,
		refunded: Amount,
	},
	/// A refund was rejected and the cancellation rolled back.
	RefundFailed {
		customer: CustomerId,
		amount: Amount,
		reason: String,
	},
}

impl LedgerEvent {
	/// The customer the event concerns.
	pub fn customer(&self) -> &CustomerId {
		match self {
			LedgerEvent::OrderPlaced { customer, .. }
			| LedgerEvent::OrderConfirmed { customer, .. }
			| LedgerEvent::OrderCancelled { customer, .. }
			| LedgerEvent::RefundFailed { customer, .. } => customer,
		}
	}
}
