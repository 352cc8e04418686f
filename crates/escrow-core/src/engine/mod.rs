//! The order ledger.
//!
//! [`OrderLedger`] accepts orders with an exact payment, keeps that payment in
//! custody, and either retains it when the customer confirms or refunds it
//! when the customer cancels. Every operation runs to completion before the
//! next one starts, including the refund transfer inside a cancellation.

pub mod event_bus;

use crate::state::{OrderStateError, OrderStateMachine};
use escrow_storage::StorageService;
use escrow_transfer::{TransferError, TransferService};
use escrow_types::{
	Amount, CustomerId, LedgerEvent, NewOrder, Order, OrderStatus, OrderValidationError,
};
use event_bus::EventBus;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::instrument;

const EVENT_BUS_CAPACITY: usize = 1000;

/// The operation conflicts with the caller's current order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateConflict {
	/// The caller already has a placed or confirmed order.
	#[error("validation failed: prior order not yet resolved")]
	PriorOrderUnresolved,
	/// The caller has no placed order to confirm or cancel.
	#[error("no resolvable order for caller")]
	NoResolvableOrder,
}

/// Errors returned by ledger operations.
///
/// A failed operation leaves the ledger as it was before the call.
#[derive(Debug, Error)]
pub enum LedgerError {
	#[error("validation failed: {0}")]
	Validation(#[from] OrderValidationError),
	#[error(transparent)]
	StateConflict(#[from] StateConflict),
	#[error("refund failed: {0}")]
	Transfer(#[from] TransferError),
	#[error("state error: {0}")]
	State(#[from] OrderStateError),
}

/// Coarse category of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	Validation,
	StateConflict,
	Transfer,
	Internal,
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ErrorKind::Validation => write!(f, "validation"),
			ErrorKind::StateConflict => write!(f, "state_conflict"),
			ErrorKind::Transfer => write!(f, "transfer"),
			ErrorKind::Internal => write!(f, "internal"),
		}
	}
}

impl LedgerError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			LedgerError::Validation(_) => ErrorKind::Validation,
			// The prior-order check is reported as a validation failure but
			// is a conflict with existing state.
			LedgerError::StateConflict(_) => ErrorKind::StateConflict,
			LedgerError::Transfer(_) => ErrorKind::Transfer,
			LedgerError::State(_) => ErrorKind::Internal,
		}
	}
}

/// Escrowed order ledger.
///
/// One slot per customer. Shared between tasks as `Arc<OrderLedger>`.
pub struct OrderLedger {
	id: String,
	price: Amount,
	state_machine: Arc<OrderStateMachine>,
	transfer: Arc<TransferService>,
	event_bus: EventBus,
	/// Held for the full duration of every operation.
	lock: Mutex<()>,
}

impl OrderLedger {
	pub fn new(
		id: impl Into<String>,
		price: Amount,
		storage: Arc<StorageService>,
		transfer: Arc<TransferService>,
	) -> Self {
		Self {
			id: id.into(),
			price,
			state_machine: Arc::new(OrderStateMachine::new(storage)),
			transfer,
			event_bus: EventBus::new(EVENT_BUS_CAPACITY),
			lock: Mutex::new(()),
		}
	}

	/// Identifier of this ledger instance.
	pub fn id(&self) -> &str {
		&self.id
	}

	/// The exact payment every order must carry.
	pub fn price(&self) -> Amount {
		self.price
	}

	/// Subscribes to events for every change committed after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
		self.event_bus.subscribe()
	}

	fn publish(&self, event: LedgerEvent) {
		// No subscribers is fine.
		let _ = self.event_bus.publish(event);
	}

	/// Places an order for `caller`, taking `order.payment` into custody.
	///
	/// Checks run in order: missing details, payment amount, then any
	/// unresolved prior order. A confirmed prior order is never resolved, so a
	/// customer who confirmed cannot order again.
	#[instrument(skip_all, fields(ledger = %self.id, customer = %caller))]
	pub async fn place_order(
		&self,
		caller: &CustomerId,
		order: NewOrder,
	) -> Result<Order, LedgerError> {
		let _guard = self.lock.lock().await;

		if let Err(e) = order.validate(self.price) {
			tracing::warn!(error = %e, payment = %order.payment, "Order rejected");
			return Err(e.into());
		}

		if let Some(prior) = self.state_machine.get_slot(caller).await? {
			if prior.order.is_valid {
				tracing::warn!(status = %prior.status(), "Order rejected: prior order unresolved");
				return Err(StateConflict::PriorOrderUnresolved.into());
			}
		}

		let slot = self
			.state_machine
			.open_slot(
				caller,
				Order::placed(order.customer_name, order.shipping_address),
				order.payment,
			)
			.await?;

		tracing::info!(amount = %slot.custodied, "Order placed");
		self.publish(LedgerEvent::OrderPlaced {
			customer: caller.clone(),
			order: slot.order.clone(),
			amount: slot.custodied,
		});
		Ok(slot.order)
	}

	/// Confirms `caller`'s placed order. The payment stays in custody.
	#[instrument(skip_all, fields(ledger = %self.id, customer = %caller))]
	pub async fn confirm_order(&self, caller: &CustomerId) -> Result<Order, LedgerError> {
		let _guard = self.lock.lock().await;

		self.require_placed(caller).await?;
		let slot = self.state_machine.confirm_slot(caller).await?;

		tracing::info!(amount = %slot.custodied, "Order confirmed");
		self.publish(LedgerEvent::OrderConfirmed {
			customer: caller.clone(),
			order: slot.order.clone(),
		});
		Ok(slot.order)
	}

	/// Cancels `caller`'s placed order and refunds the custodied payment.
	///
	/// The slot is cleared before the refund is sent. If the refund fails the
	/// slot is written back unchanged and the transfer error is returned.
	/// Returns the refunded amount.
	#[instrument(skip_all, fields(ledger = %self.id, customer = %caller))]
	pub async fn cancel_order(&self, caller: &CustomerId) -> Result<Amount, LedgerError> {
		let _guard = self.lock.lock().await;

		self.require_placed(caller).await?;
		let snapshot = self.state_machine.clear_slot(caller).await?;
		let refund = snapshot.custodied;

		if !refund.is_zero() {
			if let Err(e) = self.transfer.transfer(caller, refund).await {
				if let Err(restore_err) = self.state_machine.restore_slot(&snapshot).await {
					tracing::error!(
						error = %restore_err,
						refund_error = %e,
						amount = %refund,
						"Failed to restore order after rejected refund"
					);
					return Err(restore_err.into());
				}

				tracing::warn!(error = %e, amount = %refund, "Cancellation rolled back");
				self.publish(LedgerEvent::RefundFailed {
					customer: caller.clone(),
					amount: refund,
					reason: e.to_string(),
				});
				return Err(e.into());
			}
		}

		tracing::info!(amount = %refund, "Order cancelled");
		self.publish(LedgerEvent::OrderCancelled {
			customer: caller.clone(),
			refunded: refund,
		});
		Ok(refund)
	}

	/// The amount currently held for `caller`. Zero without an order.
	#[instrument(skip_all, fields(ledger = %self.id, customer = %caller))]
	pub async fn get_balance(&self, caller: &CustomerId) -> Result<Amount, LedgerError> {
		let _guard = self.lock.lock().await;

		Ok(self
			.state_machine
			.get_slot(caller)
			.await?
			.map_or(Amount::ZERO, |slot| slot.custodied))
	}

	/// The order recorded for `customer`, or the empty order.
	#[instrument(skip_all, fields(ledger = %self.id, customer = %customer))]
	pub async fn order_pair(&self, customer: &CustomerId) -> Result<Order, LedgerError> {
		let _guard = self.lock.lock().await;

		Ok(self
			.state_machine
			.get_slot(customer)
			.await?
			.map(|slot| slot.order)
			.unwrap_or_default())
	}

	/// Sum of every customer's custodied balance.
	#[instrument(skip_all, fields(ledger = %self.id))]
	pub async fn total_custody(&self) -> Result<Amount, LedgerError> {
		let _guard = self.lock.lock().await;

		let slots = self.state_machine.all_slots().await?;
		Ok(slots.iter().map(|slot| slot.custodied).sum())
	}

	async fn require_placed(&self, caller: &CustomerId) -> Result<(), LedgerError> {
		let status = self
			.state_machine
			.get_slot(caller)
			.await?
			.map_or(OrderStatus::Empty, |slot| slot.status());

		if status != OrderStatus::Placed {
			tracing::warn!(status = %status, "No resolvable order");
			return Err(StateConflict::NoResolvableOrder.into());
		}
		Ok(())
	}
}
