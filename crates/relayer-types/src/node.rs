//! Node capability traits.
//!
//! Components depend only on the capabilities they use. The alloy-backed
//! client in `relayer-delivery` implements all of them against a JSON-RPC
//! endpoint; tests use the in-memory node from the `testing` module.

use crate::{CancelReason, PendingTxSnapshot};
use alloy_primitives::{Address, Bytes, TxHash, B256};
use alloy_rpc_types::{FeeHistory, Log, TransactionRequest};
use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a node capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
	/// RPC or network failure.
	#[error("Transport error: {0}")]
	Transport(String),
	/// The node answered with something that could not be interpreted.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	/// The caller's cancellation context fired.
	#[error("{0}")]
	Cancelled(#[from] CancelReason),
}

/// A single filtered-log query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
	pub address: Address,
	pub topic: B256,
	pub from_block: u64,
	pub to_block: u64,
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptSummary {
	pub tx_hash: TxHash,
	pub block_number: u64,
	pub success: bool,
	pub gas_used: u64,
}

/// A transaction as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, PartialEq)]
pub struct TxSnapshot {
	pub hash: TxHash,
	pub tx_type: u8,
	/// Fields of the transaction, suitable for re-signing.
	pub request: TransactionRequest,
	/// Block the transaction was included in, `None` while pending.
	pub block_number: Option<u64>,
}

impl TxSnapshot {
	pub fn is_pending(&self) -> bool {
		self.block_number.is_none()
	}
}

/// Reads event logs.
#[async_trait]
pub trait ReadsLogs: Send + Sync {
	async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>, NodeError>;
}

/// Executes read-only contract calls.
#[async_trait]
pub trait ReadsContractState: Send + Sync {
	/// Calls `to` with `input` at `block`, or at the latest block when `None`.
	async fn call(&self, to: Address, input: Bytes, block: Option<u64>) -> Result<Bytes, NodeError>;
}

/// Reads the chain head.
#[async_trait]
pub trait ReadsBlockNumber: Send + Sync {
	async fn block_number(&self) -> Result<u64, NodeError>;
}

/// Suggests a legacy gas price.
#[async_trait]
pub trait SuggestsGasPrice: Send + Sync {
	async fn suggest_gas_price(&self) -> Result<u128, NodeError>;
}

/// Reads `eth_feeHistory`.
#[async_trait]
pub trait ReadsFeeHistory: ReadsBlockNumber {
	async fn fee_history(
		&self,
		block_count: u64,
		last_block: u64,
		reward_percentiles: &[f64],
	) -> Result<FeeHistory, NodeError>;
}

/// Reads the sender's transactions from the node's mempool.
#[async_trait]
pub trait ReadsPendingTransactions: Send + Sync {
	async fn pending_transactions_from(
		&self,
		sender: Address,
	) -> Result<Vec<PendingTxSnapshot>, NodeError>;
}

/// Reads transactions, receipts and account nonces.
#[async_trait]
pub trait ReadsTransactions: Send + Sync {
	async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<ReceiptSummary>, NodeError>;

	async fn transaction_by_hash(&self, hash: TxHash) -> Result<Option<TxSnapshot>, NodeError>;

	/// Returns the next nonce for `address`, counting pending transactions.
	async fn pending_nonce(&self, address: Address) -> Result<u64, NodeError>;

	/// Replays a mined transaction to recover its revert data.
	///
	/// Returns `None` when the replay does not revert or the node does not
	/// include revert data in its error.
	async fn revert_data(&self, hash: TxHash, block_number: u64) -> Result<Option<Bytes>, NodeError>;
}

/// Broadcasts signed transactions.
#[async_trait]
pub trait SubmitsTransactions: Send + Sync {
	async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, NodeError>;
}
