//! Configuration module for the Ethereum relayer adapter.
//!
//! Configuration is a single TOML document. `${VAR}` and `${VAR:-default}`
//! references are resolved from the environment before parsing, and the
//! parsed configuration is validated before it is handed out.

mod wei;

use alloy_primitives::Address;
use regex::Regex;
use relayer_types::{Fraction, GasFeeBounds, SecretString, TxType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level relayer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Chain connection and contract location.
	pub chain: ChainConfig,
	/// Signing key used for relay transactions.
	pub account: AccountConfig,
	/// Packet discovery settings.
	pub sync: SyncConfig,
	/// Transaction pricing, receipt polling and replacement.
	#[serde(default)]
	pub tx: TxConfig,
	/// Contract artifacts consulted when decoding reverts.
	#[serde(default)]
	pub revert: RevertConfig,
	/// Checkpoint persistence.
	#[serde(default)]
	pub storage: StorageConfig,
}

/// Chain connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
	pub chain_id: u64,
	pub rpc_url: String,
	/// Address of the messaging (IBC handler) contract.
	pub ibc_address: Address,
	/// Root of the per-chain data directories.
	#[serde(default = "default_data_dir")]
	pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
	PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	pub private_key: SecretString,
}

/// Packet discovery settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
	/// Maximum number of blocks covered by one `eth_getLogs` request.
	#[serde(default = "default_blocks_per_query")]
	pub blocks_per_query: u64,
	/// Checkpoint used for sent packets until one has been persisted.
	#[serde(default = "default_initial_checkpoint")]
	pub initial_send_checkpoint: u64,
	/// Checkpoint used for received packets until one has been persisted.
	#[serde(default = "default_initial_checkpoint")]
	pub initial_recv_checkpoint: u64,
	/// The channel this relayer serves.
	pub path: PathConfig,
}

fn default_blocks_per_query() -> u64 {
	1000
}

fn default_initial_checkpoint() -> u64 {
	1
}

/// Both ends of the relayed channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PathConfig {
	pub port_id: String,
	pub channel_id: String,
	pub counterparty_port_id: String,
	pub counterparty_channel_id: String,
}

/// Transaction settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TxConfig {
	#[serde(default)]
	pub tx_type: TxType,
	/// Minimum fee increase (percent) the node requires for a replacement.
	pub price_bump: Option<u64>,
	/// Gas limit used when a request does not carry one.
	pub gas_limit: Option<u64>,
	#[serde(default)]
	pub receipt: ReceiptConfig,
	#[serde(default)]
	pub dynamic: DynamicFeeConfig,
	/// Stuck transaction replacement; replacement is refused when absent.
	pub replace: Option<ReplaceTxConfig>,
}

/// Receipt polling policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReceiptConfig {
	#[serde(default = "default_receipt_attempts")]
	pub attempts: u32,
	#[serde(default = "default_receipt_interval_secs")]
	pub interval_secs: u64,
}

fn default_receipt_attempts() -> u32 {
	10
}

fn default_receipt_interval_secs() -> u64 {
	3
}

impl Default for ReceiptConfig {
	fn default() -> Self {
		Self {
			attempts: default_receipt_attempts(),
			interval_secs: default_receipt_interval_secs(),
		}
	}
}

impl ReceiptConfig {
	pub fn interval(&self) -> Duration {
		Duration::from_secs(self.interval_secs)
	}
}

/// EIP-1559 pricing derived from `eth_feeHistory`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DynamicFeeConfig {
	#[serde(default, deserialize_with = "wei::deserialize_option")]
	pub limit_priority_fee_per_gas: Option<u128>,
	#[serde(default)]
	pub priority_fee_rate: Fraction,
	#[serde(default, deserialize_with = "wei::deserialize_option")]
	pub limit_fee_per_gas: Option<u128>,
	#[serde(default)]
	pub base_fee_rate: Fraction,
	#[serde(default = "default_reward_percentile")]
	pub fee_history_reward_percentile: f64,
	#[serde(default = "default_max_retry_for_fee_history")]
	pub max_retry_for_fee_history: u32,
}

fn default_reward_percentile() -> f64 {
	50.0
}

fn default_max_retry_for_fee_history() -> u32 {
	5
}

impl Default for DynamicFeeConfig {
	fn default() -> Self {
		Self {
			limit_priority_fee_per_gas: None,
			priority_fee_rate: Fraction::ONE,
			limit_fee_per_gas: None,
			base_fee_rate: Fraction::ONE,
			fee_history_reward_percentile: default_reward_percentile(),
			max_retry_for_fee_history: default_max_retry_for_fee_history(),
		}
	}
}

/// Stuck transaction replacement policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplaceTxConfig {
	pub check_interval_secs: u64,
	pub pending_duration_to_replace_secs: u64,
	#[serde(default, deserialize_with = "wei::deserialize")]
	pub gas_price_inc: u128,
	#[serde(default, deserialize_with = "wei::deserialize")]
	pub max_gas_price: u128,
	#[serde(default, deserialize_with = "wei::deserialize")]
	pub gas_tip_cap_inc: u128,
	#[serde(default, deserialize_with = "wei::deserialize")]
	pub max_gas_tip_cap: u128,
	#[serde(default, deserialize_with = "wei::deserialize")]
	pub gas_fee_cap_inc: u128,
	#[serde(default, deserialize_with = "wei::deserialize")]
	pub max_gas_fee_cap: u128,
}

impl ReplaceTxConfig {
	pub fn check_interval(&self) -> Duration {
		Duration::from_secs(self.check_interval_secs)
	}

	pub fn pending_duration_to_replace(&self) -> Duration {
		Duration::from_secs(self.pending_duration_to_replace_secs)
	}

	pub fn bounds(&self) -> GasFeeBounds {
		GasFeeBounds {
			gas_price_inc: self.gas_price_inc,
			max_gas_price: self.max_gas_price,
			gas_tip_cap_inc: self.gas_tip_cap_inc,
			max_gas_tip_cap: self.max_gas_tip_cap,
			gas_fee_cap_inc: self.gas_fee_cap_inc,
			max_gas_fee_cap: self.max_gas_fee_cap,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RevertConfig {
	/// Directories searched recursively for JSON contract artifacts.
	#[serde(default)]
	pub artifact_dirs: Vec<PathBuf>,
}

/// Which storage backend holds the checkpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
	#[default]
	File,
	Memory,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
	#[serde(default)]
	pub backend: StorageBackend,
	/// Overrides `<data_dir>/<chain_id>` as the checkpoint directory.
	pub path: Option<PathBuf>,
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable and
/// `${VAR_NAME:-default}` with the value or the given default.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;
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
		result.push_str(&input[last..full_match.start()]);
		result.push_str(&value);
		last = full_match.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

impl Config {
	/// Loads and validates configuration from a TOML file.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Cannot read {}: {}", path.display(), e),
			))
		})?;
		content.parse()
	}

	/// Directory holding this chain's checkpoint records.
	pub fn checkpoint_dir(&self) -> PathBuf {
		match &self.storage.path {
			Some(path) => path.clone(),
			None => self.chain.data_dir.join(self.chain.chain_id.to_string()),
		}
	}

	/// Validates values serde cannot check on its own.
	fn validate(&self) -> Result<(), ConfigError> {
		let url = self.chain.rpc_url.trim();
		if url.is_empty() {
			return Err(ConfigError::Validation("chain.rpc_url cannot be empty".into()));
		}
		if !url.starts_with("http://") && !url.starts_with("https://") {
			return Err(ConfigError::Validation(
				"chain.rpc_url must start with http:// or https://".into(),
			));
		}
		if self.chain.ibc_address == Address::ZERO {
			return Err(ConfigError::Validation(
				"chain.ibc_address cannot be the zero address".into(),
			));
		}
		if self.account.private_key.is_empty() {
			return Err(ConfigError::Validation(
				"account.private_key cannot be empty".into(),
			));
		}

		if self.sync.blocks_per_query == 0 {
			return Err(ConfigError::Validation(
				"sync.blocks_per_query must be greater than 0".into(),
			));
		}
		let path = &self.sync.path;
		for (name, value) in [
			("port_id", &path.port_id),
			("channel_id", &path.channel_id),
			("counterparty_port_id", &path.counterparty_port_id),
			("counterparty_channel_id", &path.counterparty_channel_id),
		] {
			if value.trim().is_empty() {
				return Err(ConfigError::Validation(format!(
					"sync.path.{} cannot be empty",
					name
				)));
			}
		}

		if self.tx.receipt.attempts == 0 {
			return Err(ConfigError::Validation(
				"tx.receipt.attempts must be at least 1".into(),
			));
		}

		let dynamic = &self.tx.dynamic;
		for (name, rate) in [
			("priority_fee_rate", dynamic.priority_fee_rate),
			("base_fee_rate", dynamic.base_fee_rate),
		] {
			if rate.denominator == 0 {
				return Err(ConfigError::Validation(format!(
					"tx.dynamic.{} denominator cannot be 0",
					name
				)));
			}
		}
		if !(0.0..=100.0).contains(&dynamic.fee_history_reward_percentile) {
			return Err(ConfigError::Validation(format!(
				"tx.dynamic.fee_history_reward_percentile must be within [0, 100], got {}",
				dynamic.fee_history_reward_percentile
			)));
		}

		if let Some(replace) = &self.tx.replace {
			if replace.check_interval_secs == 0 {
				return Err(ConfigError::Validation(
					"tx.replace.check_interval_secs must be greater than 0".into(),
				));
			}
			if replace.pending_duration_to_replace_secs == 0 {
				return Err(ConfigError::Validation(
					"tx.replace.pending_duration_to_replace_secs must be greater than 0".into(),
				));
			}
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved first and the result is validated.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
