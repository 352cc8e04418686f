//! In-process wallet transfers.
//!
//! Every recipient has a wallet balance held in memory. A transfer credits the
//! recipient's wallet unless the recipient is configured to refuse incoming
//! payments, which stands in for a payee that cannot receive funds.

use crate::{TransferError, TransferInterface, TransferReceipt};
use async_trait::async_trait;
use escrow_types::{
	Amount, ConfigSchema, CustomerId, Field, FieldType, Schema, ValidationError,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Transfers into in-memory wallets.
pub struct WalletTransfer {
	wallets: RwLock<HashMap<CustomerId, Amount>>,
	rejecting: HashSet<CustomerId>,
	next_reference: AtomicU64,
}

impl WalletTransfer {
	pub fn new() -> Self {
		Self::with_rejecting(Vec::<CustomerId>::new())
	}

	/// Creates wallets where the given recipients refuse every transfer.
	pub fn with_rejecting(rejecting: impl IntoIterator<Item = CustomerId>) -> Self {
		Self {
			wallets: RwLock::new(HashMap::new()),
			rejecting: rejecting.into_iter().collect(),
			next_reference: AtomicU64::new(1),
		}
	}

	/// Total received by `recipient` so far.
	pub async fn balance_of(&self, recipient: &CustomerId) -> Amount {
		let wallets = self.wallets.read().await;
		wallets.get(recipient).copied().unwrap_or_default()
	}
}

impl Default for WalletTransfer {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl TransferInterface for WalletTransfer {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(WalletTransferSchema)
	}

	async fn transfer(
		&self,
		recipient: &CustomerId,
		amount: Amount,
	) -> Result<TransferReceipt, TransferError> {
		if amount.is_zero() {
			return Err(TransferError::InvalidAmount(
				"cannot transfer a zero amount".into(),
			));
		}
		if self.rejecting.contains(recipient) {
			return Err(TransferError::Rejected {
				recipient: recipient.clone(),
				reason: "recipient does not accept transfers".into(),
			});
		}

		let mut wallets = self.wallets.write().await;
		let balance = wallets.entry(recipient.clone()).or_default();
		*balance = balance.checked_add(amount).ok_or_else(|| {
			TransferError::InvalidAmount(format!("wallet of {} would overflow", recipient))
		})?;

		let reference = self.next_reference.fetch_add(1, Ordering::Relaxed);
		Ok(TransferReceipt {
			recipient: recipient.clone(),
			amount,
			reference: format!("wallet-{}", reference),
		})
	}
}

/// Configuration schema for WalletTransfer.
pub struct WalletTransferSchema;

impl ConfigSchema for WalletTransferSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new(
				"rejecting",
				FieldType::Array(Box::new(FieldType::String)),
			)],
		);
		schema.validate(config)
	}
}

/// Creates a wallet transfer implementation.
///
/// Optional configuration parameters:
/// - `rejecting`: recipients that refuse incoming transfers (default: none)
pub fn create_transfer(config: &toml::Value) -> Result<Box<dyn TransferInterface>, TransferError> {
	WalletTransferSchema
		.validate(config)
		.map_err(|e| TransferError::Configuration(e.to_string()))?;

	let rejecting = config
		.get("rejecting")
		.and_then(|v| v.as_array())
		.map(|items| {
			items
				.iter()
				.filter_map(|item| item.as_str())
				.map(CustomerId::from)
				.collect::<Vec<_>>()
		})
		.unwrap_or_default();

	Ok(Box::new(WalletTransfer::with_rejecting(rejecting)))
}

/// Registry for the wallet transfer implementation.
pub struct Registry;

impl escrow_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "wallet";
	type Factory = crate::TransferFactory;

	fn factory() -> Self::Factory {
		create_transfer
	}
}

impl crate::TransferRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_transfer_credits_wallet() {
		let wallet = WalletTransfer::new();
		let alex = CustomerId::from("alex");

		let first = wallet.transfer(&alex, Amount::new(10)).await.unwrap();
		let second = wallet.transfer(&alex, Amount::new(5)).await.unwrap();

		assert_eq!(wallet.balance_of(&alex).await, Amount::new(15));
		assert_ne!(first.reference, second.reference);
	}

	#[tokio::test]
	async fn test_rejecting_recipient_receives_nothing() {
		let wallet = WalletTransfer::with_rejecting([CustomerId::from("bob")]);
		let bob = CustomerId::from("bob");

		let err = wallet.transfer(&bob, Amount::new(10)).await.unwrap_err();
		assert!(err.to_string().contains("rejected"));
		assert_eq!(wallet.balance_of(&bob).await, Amount::ZERO);
	}

	#[tokio::test]
	async fn test_zero_amount_rejected() {
		let wallet = WalletTransfer::new();
		let err = wallet
			.transfer(&CustomerId::from("alex"), Amount::ZERO)
			.await
			.unwrap_err();
		assert!(matches!(err, TransferError::InvalidAmount(_)));
	}

	#[test]
	fn test_factory_reads_rejecting_list() {
		let config: toml::Value = toml::from_str(r#"rejecting = ["bob", "carol"]"#).unwrap();
		assert!(create_transfer(&config).is_ok());

		let bad: toml::Value = toml::from_str(r#"rejecting = "bob""#).unwrap();
		assert!(create_transfer(&bad).is_err());
	}
}
