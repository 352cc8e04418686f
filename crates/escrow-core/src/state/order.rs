//! Order slot state machine.
//!
//! Each customer owns at most one slot, stored as a single record holding both
//! the order and its custodied balance. Slots move Empty -> Placed, then either
//! Placed -> Confirmed or Placed -> Empty. Confirmed is terminal. An Empty slot
//! is simply an absent record.

use escrow_storage::{StorageError, StorageService};
use escrow_types::{Amount, CustomerId, Order, OrderSlot, OrderStatus, StorageKey};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors that can occur during order slot management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("No order slot for {0}")]
	SlotNotFound(CustomerId),
	#[error("Time error: {0}")]
	TimeError(String),
}

impl From<StorageError> for OrderStateError {
	fn from(err: StorageError) -> Self {
		OrderStateError::Storage(err.to_string())
	}
}

/// Static transition table. Each state maps to its allowed next states.
static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(OrderStatus::Empty, HashSet::from([OrderStatus::Placed]));
	m.insert(
		OrderStatus::Placed,
		HashSet::from([OrderStatus::Confirmed, OrderStatus::Empty]),
	);
	m.insert(OrderStatus::Confirmed, HashSet::new()); // terminal
	m
});

fn now_secs() -> Result<u64, OrderStateError> {
	Ok(SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map_err(|e| OrderStateError::TimeError(e.to_string()))?
		.as_secs())
}

/// Manages order slot transitions and persistence.
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Checks if a state transition is valid.
	pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
		TRANSITIONS
			.get(&from)
			.is_some_and(|allowed| allowed.contains(&to))
	}

	fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderStateError> {
		if Self::is_valid_transition(from, to) {
			Ok(())
		} else {
			Err(OrderStateError::InvalidTransition { from, to })
		}
	}

	/// Gets a customer's slot. `None` is the Empty slot.
	pub async fn get_slot(
		&self,
		customer: &CustomerId,
	) -> Result<Option<OrderSlot>, OrderStateError> {
		match self
			.storage
			.retrieve(StorageKey::OrderSlots.as_str(), customer.as_str())
			.await
		{
			Ok(slot) => Ok(Some(slot)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	/// Every non-empty slot.
	pub async fn all_slots(&self) -> Result<Vec<OrderSlot>, OrderStateError> {
		let slots: Vec<(String, OrderSlot)> = self
			.storage
			.retrieve_all(StorageKey::OrderSlots.as_str())
			.await?;
		Ok(slots.into_iter().map(|(_, slot)| slot).collect())
	}

	/// Writes a slot after checking the move from its stored state is allowed.
	pub async fn store_slot(&self, slot: &OrderSlot) -> Result<(), OrderStateError> {
		let current = self
			.get_slot(&slot.customer)
			.await?
			.map_or(OrderStatus::Empty, |s| s.status());
		Self::check_transition(current, slot.status())?;

		self.storage
			.store(StorageKey::OrderSlots.as_str(), slot.customer.as_str(), slot)
			.await?;
		Ok(())
	}

	/// Opens a Placed slot holding `custodied` for `customer`.
	pub async fn open_slot(
		&self,
		customer: &CustomerId,
		order: Order,
		custodied: Amount,
	) -> Result<OrderSlot, OrderStateError> {
		let now = now_secs()?;
		let slot = OrderSlot {
			customer: customer.clone(),
			order,
			custodied,
			placed_at: now,
			updated_at: now,
		};
		self.store_slot(&slot).await?;
		Ok(slot)
	}

	/// Moves a Placed slot to Confirmed. The custodied balance is kept.
	pub async fn confirm_slot(&self, customer: &CustomerId) -> Result<OrderSlot, OrderStateError> {
		let mut slot = self
			.get_slot(customer)
			.await?
			.ok_or_else(|| OrderStateError::SlotNotFound(customer.clone()))?;

		slot.order.has_confirmed = true;
		slot.updated_at = now_secs()?;
		self.store_slot(&slot).await?;
		Ok(slot)
	}

	/// Empties a Placed slot and returns what it held.
	pub async fn clear_slot(&self, customer: &CustomerId) -> Result<OrderSlot, OrderStateError> {
		let slot = self
			.get_slot(customer)
			.await?
			.ok_or_else(|| OrderStateError::SlotNotFound(customer.clone()))?;
		Self::check_transition(slot.status(), OrderStatus::Empty)?;

		self.storage
			.remove(StorageKey::OrderSlots.as_str(), customer.as_str())
			.await?;
		Ok(slot)
	}

	/// Writes back a slot previously returned by [`clear_slot`](Self::clear_slot).
	///
	/// Skips the transition check; this undoes a clear rather than moving forward.
	pub async fn restore_slot(&self, slot: &OrderSlot) -> Result<(), OrderStateError> {
		self.storage
			.store(StorageKey::OrderSlots.as_str(), slot.customer.as_str(), slot)
			.await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use escrow_storage::implementations::memory::MemoryStorage;

	fn state_machine() -> OrderStateMachine {
		OrderStateMachine::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	#[test]
	fn test_transition_table() {
		use OrderStatus::*;

		assert!(OrderStateMachine::is_valid_transition(Empty, Placed));
		assert!(OrderStateMachine::is_valid_transition(Placed, Confirmed));
		assert!(OrderStateMachine::is_valid_transition(Placed, Empty));

		assert!(!OrderStateMachine::is_valid_transition(Empty, Confirmed));
		assert!(!OrderStateMachine::is_valid_transition(Placed, Placed));
		assert!(!OrderStateMachine::is_valid_transition(Confirmed, Empty));
		assert!(!OrderStateMachine::is_valid_transition(Confirmed, Placed));
	}

	#[tokio::test]
	async fn test_open_confirm_lifecycle() {
		let sm = state_machine();
		let alex = CustomerId::from("alex");

		assert!(sm.get_slot(&alex).await.unwrap().is_none());

		let slot = sm
			.open_slot(&alex, Order::placed("Alex", "123 Main St"), Amount::new(10))
			.await
			.unwrap();
		assert_eq!(slot.status(), OrderStatus::Placed);

		let confirmed = sm.confirm_slot(&alex).await.unwrap();
		assert_eq!(confirmed.status(), OrderStatus::Confirmed);
		assert_eq!(confirmed.custodied, Amount::new(10));

		// Confirmed is terminal.
		let err = sm.clear_slot(&alex).await.unwrap_err();
		assert!(matches!(
			err,
			OrderStateError::InvalidTransition {
				from: OrderStatus::Confirmed,
				to: OrderStatus::Empty
			}
		));
	}

	#[tokio::test]
	async fn test_cannot_open_over_placed_slot() {
		let sm = state_machine();
		let alex = CustomerId::from("alex");

		sm.open_slot(&alex, Order::placed("Alex", "1 St"), Amount::new(10))
			.await
			.unwrap();
		let err = sm
			.open_slot(&alex, Order::placed("Alex", "2 St"), Amount::new(10))
			.await
			.unwrap_err();
		assert!(matches!(err, OrderStateError::InvalidTransition { .. }));

		let slot = sm.get_slot(&alex).await.unwrap().unwrap();
		assert_eq!(slot.order.shipping_address, "1 St");
	}

	#[tokio::test]
	async fn test_clear_then_restore() {
		let sm = state_machine();
		let alex = CustomerId::from("alex");

		let opened = sm
			.open_slot(&alex, Order::placed("Alex", "123 Main St"), Amount::new(10))
			.await
			.unwrap();

		let cleared = sm.clear_slot(&alex).await.unwrap();
		assert_eq!(cleared, opened);
		assert!(sm.get_slot(&alex).await.unwrap().is_none());
		assert!(sm.all_slots().await.unwrap().is_empty());

		sm.restore_slot(&cleared).await.unwrap();
		assert_eq!(sm.get_slot(&alex).await.unwrap(), Some(opened));
	}

	#[tokio::test]
	async fn test_confirm_missing_slot() {
		let sm = state_machine();
		let err = sm.confirm_slot(&CustomerId::from("nobody")).await.unwrap_err();
		assert!(matches!(err, OrderStateError::SlotNotFound(_)));
	}
}
