//! Order slot types.
//!
//! A customer owns exactly one [`OrderSlot`]. The slot carries the public
//! [`Order`] view together with the amount the ledger custodies for it, so
//! that the order and its funds always change in a single write.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{Amount, CustomerId};

/// The public view of a customer's order slot.
///
/// `Order::default()` is the empty slot: not valid, not confirmed, and with
/// empty name and address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	pub customer_name: String,
	pub shipping_address: String,
	pub is_valid: bool,
	pub has_confirmed: bool,
}

impl Order {
	/// A freshly placed, unconfirmed order.
	pub fn placed(customer_name: impl Into<String>, shipping_address: impl Into<String>) -> Self {
		Self {
			customer_name: customer_name.into(),
			shipping_address: shipping_address.into(),
			is_valid: true,
			has_confirmed: false,
		}
	}

	/// Derives the lifecycle status from the flags.
	pub fn status(&self) -> OrderStatus {
		match (self.is_valid, self.has_confirmed) {
			(true, true) => OrderStatus::Confirmed,
			(true, false) => OrderStatus::Placed,
			_ => OrderStatus::Empty,
		}
	}
}

/// Lifecycle status of an order slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
	/// Never placed, or cleared by a cancellation.
	Empty,
	/// Paid for and awaiting confirmation or cancellation.
	Placed,
	/// Confirmed by the customer. Terminal.
	Confirmed,
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderStatus::Empty => write!(f, "empty"),
			OrderStatus::Placed => write!(f, "placed"),
			OrderStatus::Confirmed => write!(f, "confirmed"),
		}
	}
}

/// Persisted record for one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSlot {
	/// Owner of the slot.
	pub customer: CustomerId,
	/// Current order state.
	pub order: Order,
	/// Funds held on behalf of the customer for this order.
	pub custodied: Amount,
	/// Timestamp when the order was placed.
	pub placed_at: u64,
	/// Timestamp of the last change.
	pub updated_at: u64,
}

impl OrderSlot {
	pub fn status(&self) -> OrderStatus {
		self.order.status()
	}
}

/// Input to a placement request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
	pub customer_name: String,
	pub shipping_address: String,
	pub payment: Amount,
}

impl NewOrder {
	pub fn new(
		customer_name: impl Into<String>,
		shipping_address: impl Into<String>,
		payment: impl Into<Amount>,
	) -> Self {
		Self {
			customer_name: customer_name.into(),
			shipping_address: shipping_address.into(),
			payment: payment.into(),
		}
	}

	/// Checks the input against the fixed price.
	///
	/// Missing details are reported before an incorrect payment.
	pub fn validate(&self, price: Amount) -> Result<(), OrderValidationError> {
		if self.customer_name.is_empty() || self.shipping_address.is_empty() {
			return Err(OrderValidationError::MissingDetails);
		}
		if self.payment != price {
			return Err(OrderValidationError::IncorrectPayment {
				expected: price,
				received: self.payment,
			});
		}
		Ok(())
	}
}

/// Malformed placement input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderValidationError {
	#[error("missing customer name or shipping address")]
	MissingDetails,
	#[error("incorrect payment amount")]
	IncorrectPayment { expected: Amount, received: Amount },
}
