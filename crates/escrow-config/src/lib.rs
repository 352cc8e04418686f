//! Configuration for the escrow ledger.
//!
//! Configuration is read from TOML. String values may reference environment
//! variables as `${VAR}` or `${VAR:-default}`, and a file may pull in other
//! files with `include = ["storage.toml", ...]`. Each top-level section must
//! be defined in exactly one file.

mod loader;

use escrow_types::Amount;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message only; the default rendering echoes the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Ledger identity and pricing.
	pub ledger: LedgerConfig,
	/// Where order slots are kept.
	pub storage: StorageConfig,
	/// How refunds are paid out.
	pub transfer: TransferConfig,
	/// HTTP API server, if any.
	pub api: Option<ApiConfig>,
}

/// Ledger identity and the fixed order price.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
	/// Name of this ledger instance, used in logs.
	pub id: String,
	/// The exact payment every order must carry.
	#[serde(default = "default_price")]
	pub price: Amount,
}

fn default_price() -> Amount {
	Amount::new(10)
}

/// Storage backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Implementation name to its raw configuration table.
	pub implementations: HashMap<String, toml::Value>,
}

/// Refund transfer backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Implementation name to its raw configuration table.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

/// Replaces `${VAR}` and `${VAR:-default}` with environment values.
///
/// Input is capped at 1MB before the regex runs.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut replacements = Vec::new();
	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};
		replacements.push((full_match.start(), full_match.end(), value));
	}

	let mut result = input.to_string();
	// Back to front so earlier offsets stay valid.
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
		let file_name = path.file_name().ok_or_else(|| {
			ConfigError::Validation(format!("Invalid path: {}", path.display()))
		})?;

		let mut loader = loader::ConfigLoader::new(base_dir);
		loader.load_config(file_name).await
	}

	/// The fixed order price.
	pub fn price(&self) -> Amount {
		self.ledger.price
	}

	/// Whether the HTTP API should be started.
	pub fn api_enabled(&self) -> bool {
		self.api.as_ref().is_some_and(|api| api.enabled)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.ledger.id.is_empty() {
			return Err(ConfigError::Validation("Ledger ID cannot be empty".into()));
		}
		if self.ledger.price.is_zero() {
			return Err(ConfigError::Validation(
				"Ledger price must be greater than 0".into(),
			));
		}

		validate_selection(
			"storage",
			&self.storage.primary,
			&self.storage.implementations,
		)?;
		validate_selection(
			"transfer",
			&self.transfer.primary,
			&self.transfer.implementations,
		)?;

		if let Some(api) = &self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation(
					"API port must be greater than 0".into(),
				));
			}
		}

		Ok(())
	}
}

/// Checks that a section names a primary implementation it also configures.
fn validate_selection(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses a TOML string, resolving environment variables and validating the
/// result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const BASE: &str = r#"
[ledger]
id = "test-ledger"

[storage]
primary = "memory"
[storage.implementations.memory]

[transfer]
primary = "wallet"
[transfer.implementations.wallet]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("ESCROW_TEST_HOST", "localhost");
		std::env::set_var("ESCROW_TEST_PORT", "5432");

		let input = "host = \"${ESCROW_TEST_HOST}:${ESCROW_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("ESCROW_TEST_HOST");
		std::env::remove_var("ESCROW_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${ESCROW_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${ESCROW_MISSING_VAR}\"";
		let err = resolve_env_vars(input).unwrap_err();
		assert!(err.to_string().contains("ESCROW_MISSING_VAR"));
	}

	#[test]
	fn test_price_defaults_to_ten() {
		let config: Config = BASE.parse().unwrap();
		assert_eq!(config.ledger.id, "test-ledger");
		assert_eq!(config.price(), Amount::new(10));
		assert!(!config.api_enabled());
	}

	#[test]
	fn test_price_from_env() {
		std::env::set_var("ESCROW_TEST_PRICE", "25");
		let config_str = BASE.replace(
			"id = \"test-ledger\"",
			"id = \"test-ledger\"\nprice = ${ESCROW_TEST_PRICE}",
		);
		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.price(), Amount::new(25));
		std::env::remove_var("ESCROW_TEST_PRICE");
	}

	#[test]
	fn test_zero_price_rejected() {
		let config_str = BASE.replace("id = \"test-ledger\"", "id = \"test-ledger\"\nprice = 0");
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("price must be greater than 0"));
	}

	#[test]
	fn test_unknown_primary_rejected() {
		let config_str = BASE.replace("primary = \"wallet\"", "primary = \"bank\"");
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err
			.to_string()
			.contains("Primary transfer 'bank' not found in implementations"));
	}

	#[test]
	fn test_missing_section_rejected() {
		let config_str = r#"
[ledger]
id = "test-ledger"

[storage]
primary = "memory"
[storage.implementations.memory]
"#;
		assert!(Config::from_str(config_str).is_err());
	}

	#[test]
	fn test_api_section() {
		let config_str = format!("{}\n[api]\nenabled = true\nport = 8080\n", BASE);
		let config: Config = config_str.parse().unwrap();
		assert!(config.api_enabled());
		let api = config.api.unwrap();
		assert_eq!(api.host, "127.0.0.1");
		assert_eq!(api.port, 8080);
	}
}
