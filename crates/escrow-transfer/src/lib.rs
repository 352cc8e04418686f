//! Fund transfer module for the escrow ledger.
//!
//! Refunds leave the ledger through a [`TransferInterface`]. The ledger never
//! knows where the money goes; it only learns whether the recipient accepted
//! it. Implementations are selected by name from configuration.

use async_trait::async_trait;
use escrow_types::{Amount, ConfigSchema, CustomerId, ImplementationRegistry};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod implementations {
	pub mod wallet;
}

/// Errors that can occur during transfer operations.
#[derive(Debug, Error)]
pub enum TransferError {
	/// The recipient refused the transfer.
	#[error("Transfer to {recipient} rejected: {reason}")]
	Rejected { recipient: CustomerId, reason: String },
	/// The amount cannot be transferred.
	#[error("Invalid amount: {0}")]
	InvalidAmount(String),
	/// The implementation failed for another reason.
	#[error("Implementation error: {0}")]
	Implementation(String),
	/// The implementation configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Proof of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
	pub recipient: CustomerId,
	pub amount: Amount,
	/// Implementation-specific reference for the payment.
	pub reference: String,
}

/// Interface for paying funds out to a customer.
///
/// A transfer either completes in full and returns a receipt, or fails and
/// moves nothing.
#[async_trait]
pub trait TransferInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Pays `amount` to `recipient`.
	async fn transfer(
		&self,
		recipient: &CustomerId,
		amount: Amount,
	) -> Result<TransferReceipt, TransferError>;
}

/// Factory function signature every transfer implementation provides.
pub type TransferFactory = fn(&toml::Value) -> Result<Box<dyn TransferInterface>, TransferError>;

/// Registry trait for transfer implementations.
pub trait TransferRegistry: ImplementationRegistry<Factory = TransferFactory> {}

/// Get all registered transfer implementations as `(name, factory)` pairs.
pub fn get_all_implementations() -> Vec<(&'static str, TransferFactory)> {
	use implementations::wallet;

	vec![(wallet::Registry::NAME, wallet::Registry::factory())]
}

/// Service that performs transfers through the selected implementation.
pub struct TransferService {
	implementation: Box<dyn TransferInterface>,
}

impl TransferService {
	pub fn new(implementation: Box<dyn TransferInterface>) -> Self {
		Self { implementation }
	}

	/// Pays `amount` to `recipient`, logging the outcome.
	pub async fn transfer(
		&self,
		recipient: &CustomerId,
		amount: Amount,
	) -> Result<TransferReceipt, TransferError> {
		match self.implementation.transfer(recipient, amount).await {
			Ok(receipt) => {
				tracing::debug!(
					recipient = %receipt.recipient,
					amount = %receipt.amount,
					reference = %receipt.reference,
					"Transfer completed"
				);
				Ok(receipt)
			},
			Err(e) => {
				tracing::warn!(
					recipient = %recipient,
					amount = %amount,
					error = %e,
					"Transfer failed"
				);
				Err(e)
			},
		}
	}
}
