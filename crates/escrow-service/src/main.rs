//! Main entry point for the escrow ledger service.
//!
//! Loads configuration, builds the ledger with the configured storage and
//! transfer implementations, and serves the HTTP API.

use clap::Parser;
use escrow_config::Config;
use escrow_core::{LedgerBuilder, LedgerFactories, OrderLedger};
use escrow_types::LedgerEvent;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

mod apis;
mod server;

/// Command-line arguments for the escrow service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started escrow service");

	let config = Config::from_file(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.ledger.id);

	let ledger = Arc::new(build_ledger(config.clone())?);
	tokio::spawn(log_events(ledger.clone()));

	let api_config = config.api_enabled().then(|| config.api.clone()).flatten();
	match api_config {
		Some(api_config) => server::start_server(api_config, ledger).await?,
		None => {
			tracing::warn!("API server disabled; waiting for shutdown");
			tokio::signal::ctrl_c().await?;
		},
	}

	tracing::info!("Stopped escrow service");
	Ok(())
}

/// Builds the ledger from every registered storage and transfer implementation.
fn build_ledger(config: Config) -> Result<OrderLedger, Box<dyn std::error::Error>> {
	let factories = LedgerFactories {
		storage_factories: escrow_storage::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect(),
		transfer_factories: escrow_transfer::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect(),
	};

	Ok(LedgerBuilder::new(config).build(factories)?)
}

/// Writes every ledger event to the log.
async fn log_events(ledger: Arc<OrderLedger>) {
	let mut events = ledger.subscribe();
	loop {
		match events.recv().await {
			Ok(event) => match &event {
				LedgerEvent::RefundFailed { .. } => {
					tracing::warn!(customer = %event.customer(), ?event, "Ledger event")
				},
				_ => tracing::debug!(customer = %event.customer(), ?event, "Ledger event"),
			},
			Err(RecvError::Lagged(skipped)) => {
				tracing::warn!(skipped, "Event logger fell behind");
			},
			Err(RecvError::Closed) => break,
		}
	}
}
