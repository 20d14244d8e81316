//! Ethereum chain adapter for the relayer.
//!
//! `EthereumChain` is the surface the relayer framework drives: it finds
//! packets and acknowledgements that still need relaying, prices and submits
//! relay transactions, replaces stuck ones, and explains reverts. Instances
//! are assembled from a `Config` by [`ChainBuilder`].

use alloy_primitives::{Address, TxHash};
use alloy_rpc_types::TransactionRequest;
use relayer_config::Config;
use relayer_delivery::implementations::evm::alloy::AlloyNode;
use relayer_delivery::{DeliveryError, DeliveryNode, ReplacementOutcome, TxLifecycleManager};
use relayer_discovery::{Counterparty, DiscoveryError, PacketSyncEngine};
use relayer_revert::{ErrorRepository, RevertError};
use relayer_storage::StorageError;
use relayer_types::{
	CancelReason, CancelToken, Direction, GasPricing, NodeError, PacketInfo, ReadsContractState,
	ReadsLogs, ReceiptSummary,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;

pub mod builder;

pub use builder::ChainBuilder;

/// Errors surfaced by the chain adapter.
#[derive(Debug, Error)]
pub enum ChainError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error(transparent)]
	Delivery(#[from] DeliveryError),
	#[error(transparent)]
	Discovery(#[from] DiscoveryError),
	#[error(transparent)]
	Revert(#[from] RevertError),
	#[error(transparent)]
	Storage(#[from] StorageError),
	#[error(transparent)]
	Node(#[from] NodeError),
	#[error("{0}")]
	Cancelled(#[from] CancelReason),
}

/// Relayer adapter for one Ethereum chain and one channel.
pub struct EthereumChain<N = AlloyNode> {
	config: Config,
	node: Arc<N>,
	errors: Arc<ErrorRepository>,
	delivery: TxLifecycleManager<N>,
	sync: PacketSyncEngine<N>,
}

impl<N> EthereumChain<N>
where
	N: DeliveryNode + ReadsLogs + ReadsContractState,
{
	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn chain_id(&self) -> u64 {
		self.config.chain.chain_id
	}

	pub fn ibc_address(&self) -> Address {
		self.config.chain.ibc_address
	}

	/// Address relay transactions are sent from.
	pub fn sender(&self) -> Address {
		self.delivery.sender()
	}

	pub fn node(&self) -> &Arc<N> {
		&self.node
	}

	pub fn error_repository(&self) -> &ErrorRepository {
		&self.errors
	}

	pub fn delivery(&self) -> &TxLifecycleManager<N> {
		&self.delivery
	}

	pub fn sync_engine(&self) -> &PacketSyncEngine<N> {
		&self.sync
	}

	/// Current head of the chain.
	pub async fn latest_height(&self, ctx: &CancelToken) -> Result<u64, ChainError> {
		Ok(ctx.guard(self.node.block_number()).await?)
	}

	/// Sent packets not yet received by the counterparty, up to `target_height`.
	pub async fn unrelayed_packets(
		&self,
		ctx: &CancelToken,
		target_height: u64,
		counterparty: &dyn Counterparty,
	) -> Result<Vec<PacketInfo>, ChainError> {
		Ok(self
			.sync
			.unrelayed_packets(ctx, target_height, counterparty)
			.await?)
	}

	/// Received packets whose acknowledgement has not reached the
	/// counterparty, up to `target_height`.
	pub async fn unrelayed_acknowledgements(
		&self,
		ctx: &CancelToken,
		target_height: u64,
		counterparty: &dyn Counterparty,
	) -> Result<Vec<PacketInfo>, ChainError> {
		Ok(self
			.sync
			.unrelayed_acknowledgements(ctx, target_height, counterparty)
			.await?)
	}

	pub async fn is_channel_open(
		&self,
		ctx: &CancelToken,
		height: Option<u64>,
	) -> Result<bool, ChainError> {
		Ok(self.sync.is_channel_open(ctx, height).await?)
	}

	pub fn invalidate_channel_cache(&self) {
		self.sync.invalidate_channel_cache();
	}

	/// Persisted send and receive checkpoints.
	pub async fn checkpoints(&self) -> Result<Vec<(Direction, u64)>, ChainError> {
		let store = self.sync.checkpoints();
		let mut values = Vec::new();
		for direction in Direction::all() {
			values.push((direction, store.load(direction).await?));
		}
		Ok(values)
	}

	/// Pricing for a new transaction, or for replacing the one at `nonce`.
	pub async fn gas_pricing(
		&self,
		ctx: &CancelToken,
		nonce: Option<u64>,
	) -> Result<GasPricing, ChainError> {
		Ok(self.delivery.fee_calculator().gas_pricing(ctx, nonce).await?)
	}

	/// Signs and sends a relay transaction and waits for its receipt.
	pub async fn send_transaction(
		&self,
		ctx: &CancelToken,
		request: TransactionRequest,
	) -> Result<ReceiptSummary, ChainError> {
		Ok(self.delivery.send_transaction(ctx, request).await?)
	}

	/// Watches a pending transaction and replaces it if it stays stuck.
	pub async fn replace_stuck_transaction(
		&self,
		ctx: &CancelToken,
		tx_hash: TxHash,
		pending_since: Instant,
	) -> Result<ReplacementOutcome, ChainError> {
		Ok(self
			.delivery
			.replace_stuck_transaction(ctx, tx_hash, pending_since)
			.await?)
	}

	/// Renders revert data as `Name{"arg":value,...}`.
	pub fn decode_revert(&self, data: &[u8]) -> Result<String, ChainError> {
		Ok(self.errors.decode(data)?)
	}
}

impl EthereumChain<AlloyNode> {
	/// Fails when the endpoint serves a different chain than configured.
	pub async fn verify_chain_id(&self, ctx: &CancelToken) -> Result<(), ChainError> {
		let reported = ctx.guard(self.node.chain_id()).await?;
		if reported != self.chain_id() {
			return Err(ChainError::Config(format!(
				"RPC endpoint reports chain id {}, configured {}",
				reported,
				self.chain_id()
			)));
		}
		Ok(())
	}
}
