//! Builder for constructing an [`OrderLedger`] from configuration.
//!
//! Storage and transfer implementations are looked up by name in factory
//! maps, so the binary decides which implementations exist and the
//! configuration decides which one is used.

use crate::engine::OrderLedger;
use escrow_config::Config;
use escrow_storage::{StorageError, StorageInterface, StorageService};
use escrow_transfer::{TransferError, TransferInterface, TransferService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during ledger construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for each pluggable component, keyed by implementation name.
pub struct LedgerFactories<SF, TF> {
	pub storage_factories: HashMap<String, SF>,
	pub transfer_factories: HashMap<String, TF>,
}

/// Builds an [`OrderLedger`] from a [`Config`].
pub struct LedgerBuilder {
	config: Config,
}

impl LedgerBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Creates the primary storage and transfer implementations and wires
	/// them into a ledger.
	///
	/// Each implementation's TOML table is checked against its schema.
	pub fn build<SF, TF>(
		self,
		factories: LedgerFactories<SF, TF>,
	) -> Result<OrderLedger, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		TF: Fn(&toml::Value) -> Result<Box<dyn TransferInterface>, TransferError>,
	{
		let storage_config = &self.config.storage;
		let storage_backend = create_primary(
			"storage",
			&storage_config.primary,
			&storage_config.implementations,
			&factories.storage_factories,
			|implementation: &Box<dyn StorageInterface>, config| {
				implementation.config_schema().validate(config)
			},
		)?;

		let transfer_config = &self.config.transfer;
		let transfer_backend = create_primary(
			"transfer",
			&transfer_config.primary,
			&transfer_config.implementations,
			&factories.transfer_factories,
			|implementation: &Box<dyn TransferInterface>, config| {
				implementation.config_schema().validate(config)
			},
		)?;

		let ledger = OrderLedger::new(
			self.config.ledger.id.clone(),
			self.config.price(),
			Arc::new(StorageService::new(storage_backend)),
			Arc::new(TransferService::new(transfer_backend)),
		);

		tracing::info!(
			ledger = %self.config.ledger.id,
			price = %self.config.price(),
			storage = %storage_config.primary,
			transfer = %transfer_config.primary,
			"Ledger built"
		);
		Ok(ledger)
	}
}

/// Creates the primary implementation of one component.
fn create_primary<T, E, F, V>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
	validate: V,
) -> Result<T, BuilderError>
where
	E: std::fmt::Display,
	F: Fn(&toml::Value) -> Result<T, E>,
	V: Fn(&T, &toml::Value) -> Result<(), escrow_types::ValidationError>,
{
	for name in implementations.keys() {
		if !factories.contains_key(name) {
			tracing::warn!(component, implementation = %name, "Unknown implementation, skipping");
		}
	}

	let config = implementations.get(primary).ok_or_else(|| {
		BuilderError::MissingComponent(format!("{} implementation '{}'", component, primary))
	})?;
	let factory = factories.get(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"No factory registered for {} implementation '{}'",
			component, primary
		))
	})?;

	let implementation = factory(config).map_err(|e| {
		tracing::error!(
			component,
			implementation = %primary,
			error = %e,
			"Failed to create implementation"
		);
		BuilderError::Config(format!(
			"Failed to create {} implementation '{}': {}",
			component, primary, e
		))
	})?;

	validate(&implementation, config).map_err(|e| {
		BuilderError::Config(format!(
			"Invalid configuration for {} implementation '{}': {}",
			component, primary, e
		))
	})?;

	tracing::info!(component, implementation = %primary, "Loaded");
	Ok(implementation)
}
