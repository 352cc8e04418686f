//! Broadcast channel for ledger events.

use escrow_types::LedgerEvent;
use tokio::sync::broadcast;

/// Fan-out of [`LedgerEvent`]s to any number of subscribers.
///
/// Subscribers that fall more than `capacity` events behind miss the oldest
/// ones and see `RecvError::Lagged`.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Receives every event published after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event. Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: LedgerEvent,
	) -> Result<(), broadcast::error::SendError<LedgerEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use escrow_types::{Amount, CustomerId};

	#[tokio::test]
	async fn test_publish_reaches_all_subscribers() {
		let bus = EventBus::new(8);
		let mut first = bus.subscribe();
		let mut second = bus.subscribe();

		let event = LedgerEvent::OrderCancelled {
			customer: CustomerId::from("alex"),
			refunded: Amount::new(10),
		};
		bus.publish(event.clone()).unwrap();

		assert_eq!(first.recv().await.unwrap(), event);
		assert_eq!(second.recv().await.unwrap(), event);
	}

	#[test]
	fn test_publish_without_subscribers_fails() {
		let bus = EventBus::new(8);
		let event = LedgerEvent::OrderCancelled {
			customer: CustomerId::from("alex"),
			refunded: Amount::new(10),
		};
		assert!(bus.publish(event).is_err());
	}
}
