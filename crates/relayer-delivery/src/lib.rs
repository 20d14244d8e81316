//! Transaction delivery module for the Ethereum relayer adapter.
//!
//! This module prices, submits and monitors relay transactions. Pricing and
//! lifecycle logic are written against the node capability traits from
//! `relayer-types`; the alloy-backed client in `implementations::evm::alloy`
//! provides those capabilities over JSON-RPC.

use alloy_primitives::TxHash;
use relayer_types::{
	CancelReason, NodeError, ReadsFeeHistory, ReadsPendingTransactions, ReadsTransactions,
	SubmitsTransactions, SuggestsGasPrice,
};
use thiserror::Error;

mod fee;
mod lifecycle;
mod replacement;

pub use fee::FeeCalculator;
pub use lifecycle::TxLifecycleManager;
pub use replacement::{bump_fees, ReplacementOutcome};

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

/// Errors that can occur during transaction delivery operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// RPC or network failure.
	#[error("Transport error: {0}")]
	Transport(String),
	/// A receipt or transaction the node does not know about.
	#[error("Not found: {0}")]
	NotFound(String),
	/// The pending transaction already pays more than the node suggests.
	#[error("Stale gas price: pending transaction pays {pending}, node suggests {suggested}")]
	StaleGasPrice { pending: u128, suggested: u128 },
	/// The pending transaction already pays more tip and fee cap than suggested.
	#[error(
		"Stale dynamic fee: pending transaction pays tip cap {pending_tip_cap} and fee cap {pending_fee_cap}, suggested {suggested_tip_cap} and {suggested_fee_cap}"
	)]
	StaleDynamicFee {
		pending_tip_cap: u128,
		pending_fee_cap: u128,
		suggested_tip_cap: u128,
		suggested_fee_cap: u128,
	},
	/// Every sampled block reported a zero reward.
	#[error("No usable fee history after sampling {blocks} blocks")]
	FeeHistoryUnavailable { blocks: u32 },
	/// The transaction was mined but execution failed.
	#[error("Transaction {tx_hash} reverted: {reason}")]
	Reverted { tx_hash: TxHash, reason: String },
	/// Pricing or replacement settings that cannot produce a valid transaction.
	#[error("Configuration error: {0}")]
	Configuration(String),
	#[error("Signing failed: {0}")]
	Signing(String),
	#[error("{0}")]
	Cancelled(#[from] CancelReason),
}

impl From<NodeError> for DeliveryError {
	fn from(err: NodeError) -> Self {
		match err {
			NodeError::Transport(msg) | NodeError::InvalidResponse(msg) => DeliveryError::Transport(msg),
			NodeError::Cancelled(reason) => DeliveryError::Cancelled(reason),
		}
	}
}

impl From<relayer_account::AccountError> for DeliveryError {
	fn from(err: relayer_account::AccountError) -> Self {
		DeliveryError::Signing(err.to_string())
	}
}

/// Every node capability delivery relies on.
pub trait DeliveryNode:
	SuggestsGasPrice
	+ ReadsFeeHistory
	+ ReadsPendingTransactions
	+ ReadsTransactions
	+ SubmitsTransactions
{
}

impl<T> DeliveryNode for T where
	T: SuggestsGasPrice
		+ ReadsFeeHistory
		+ ReadsPendingTransactions
		+ ReadsTransactions
		+ SubmitsTransactions
{
}
