//! Operator CLI for the Ethereum relayer adapter.
//!
//! Loads the relayer configuration and runs one maintenance command against
//! the configured chain: decoding revert data, previewing gas pricing,
//! replacing a stuck transaction or inspecting scan checkpoints.

use alloy_primitives::TxHash;
use clap::{Parser, Subcommand};
use relayer_config::Config;
use relayer_core::{ChainBuilder, EthereumChain};
use relayer_revert::ErrorRepository;
use relayer_types::{decode_hex, truncate_id, CancelToken, GasPricing};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

/// Command-line arguments for the relayer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Decode hex-encoded revert data with the configured error catalog
	DecodeRevert {
		data: String,
		/// Print the decoded arguments as JSON
		#[arg(long)]
		json: bool,
	},
	/// Show the gas pricing a new transaction would use
	GasPrice {
		/// Price as a replacement of the pending transaction at this nonce
		#[arg(long)]
		nonce: Option<u64>,
	},
	/// Watch a pending transaction and replace it once it is stuck
	ReplaceTx {
		tx_hash: TxHash,
		/// Seconds the transaction has already been pending
		#[arg(long, default_value_t = 0)]
		pending_secs: u64,
		/// Give up after this many seconds
		#[arg(long)]
		timeout_secs: Option<u64>,
	},
	/// Print the persisted scan checkpoints
	Checkpoints,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	let config = Config::from_file(&args.config).await?;
	tracing::info!(
		chain_id = config.chain.chain_id,
		config = %args.config.display(),
		"Loaded configuration"
	);

	match args.command {
		Command::DecodeRevert { data, json } => decode_revert(&config, &data, json)?,
		Command::GasPrice { nonce } => {
			let chain = connect(config).await?;
			let pricing = chain.gas_pricing(&CancelToken::never(), nonce).await?;
			print_pricing(&pricing);
		},
		Command::ReplaceTx {
			tx_hash,
			pending_secs,
			timeout_secs,
		} => {
			let chain = connect(config).await?;
			let ctx = interruptible(timeout_secs);
			let pending_since = Instant::now()
				.checked_sub(Duration::from_secs(pending_secs))
				.unwrap_or_else(Instant::now);

			tracing::info!(tx = %truncate_id(&tx_hash.to_string()), "Watching transaction");
			let outcome = chain
				.replace_stuck_transaction(&ctx, tx_hash, pending_since)
				.await?;
			println!("{:?}", outcome);
		},
		Command::Checkpoints => {
			let chain = ChainBuilder::new(config).build()?;
			for (direction, height) in chain.checkpoints().await? {
				println!("{}\t{}", direction, height);
			}
		},
	}

	Ok(())
}

/// Builds the adapter and checks the endpoint serves the configured chain.
async fn connect(config: Config) -> Result<EthereumChain, Box<dyn std::error::Error>> {
	let chain = ChainBuilder::new(config).build()?;
	chain.verify_chain_id(&CancelToken::never()).await?;
	Ok(chain)
}

/// A token cancelled by Ctrl-C and, optionally, after `timeout_secs`.
fn interruptible(timeout_secs: Option<u64>) -> CancelToken {
	let (handle, token) = CancelToken::new();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			tracing::warn!("Interrupted");
			handle.cancel();
		}
	});
	match timeout_secs {
		Some(secs) => token.with_timeout(Duration::from_secs(secs)),
		None => token,
	}
}

fn decode_revert(config: &Config, data: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
	let bytes = decode_hex(data)?;
	let errors = ErrorRepository::from_artifact_dirs(&config.revert.artifact_dirs)?;
	if json {
		let decoded = errors.decode_structured(&bytes)?;
		let output = serde_json::json!({
			"name": decoded.name,
			"arguments": decoded.arguments_json(),
		});
		println!("{}", serde_json::to_string_pretty(&output)?);
	} else {
		println!("{}", errors.decode(&bytes)?);
	}
	Ok(())
}

fn print_pricing(pricing: &GasPricing) {
	match pricing {
		GasPricing::Legacy { gas_price } => println!("gas_price\t{}", gas_price),
		GasPricing::Dynamic {
			max_priority_fee_per_gas,
			max_fee_per_gas,
		} => {
			println!("max_priority_fee_per_gas\t{}", max_priority_fee_per_gas);
			println!("max_fee_per_gas\t{}", max_fee_per_gas);
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_decode_revert() {
		let args = Args::try_parse_from(["relayer", "decode-revert", "0x4e487b71", "--json"]).unwrap();
		assert_eq!(args.config, PathBuf::from("config.toml"));
		assert!(matches!(
			args.command,
			Command::DecodeRevert { ref data, json: true } if data == "0x4e487b71"
		));
	}

	#[test]
	fn test_parse_gas_price_with_nonce() {
		let args =
			Args::try_parse_from(["relayer", "-c", "relayer.toml", "gas-price", "--nonce", "7"]).unwrap();
		assert_eq!(args.config, PathBuf::from("relayer.toml"));
		assert!(matches!(args.command, Command::GasPrice { nonce: Some(7) }));
	}

	#[test]
	fn test_parse_replace_tx() {
		let hash = "0x00000000000000000000000000000000000000000000000000000000000000aa";
		let args = Args::try_parse_from(["relayer", "replace-tx", hash, "--pending-secs", "90"]).unwrap();
		match args.command {
			Command::ReplaceTx {
				tx_hash,
				pending_secs,
				timeout_secs,
			} => {
				assert_eq!(tx_hash.to_string(), hash);
				assert_eq!(pending_secs, 90);
				assert_eq!(timeout_secs, None);
			},
			other => panic!("unexpected command: {other:?}"),
		}
	}

	#[test]
	fn test_invalid_hash_rejected() {
		assert!(Args::try_parse_from(["relayer", "replace-tx", "0x1234"]).is_err());
		assert!(Args::try_parse_from(["relayer"]).is_err());
	}
}
