//! Alloy-backed node client.
//!
//! `AlloyNode` implements every node capability trait over a JSON-RPC HTTP
//! endpoint. It never signs: raw transactions come from the account layer.

use alloy_consensus::{Transaction as _, Typed2718};
use alloy_json_rpc::RpcError;
use alloy_primitives::{Address, Bytes, TxHash};
use alloy_provider::ext::TxPoolApi;
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types::{
	BlockId, BlockNumberOrTag, FeeHistory, Filter, Log, Transaction, TransactionRequest,
};
use alloy_transport_http::Http;
use async_trait::async_trait;
use relayer_types::{
	NodeError, PendingFees, PendingTxSnapshot, ReadsBlockNumber, ReadsContractState,
	ReadsFeeHistory, ReadsLogs, ReadsPendingTransactions, ReadsTransactions, ReceiptSummary,
	SubmitsTransactions, SuggestsGasPrice, TxSnapshot, ACCESS_LIST_TX_TYPE, LEGACY_TX_TYPE,
	LogQuery,
};

use crate::DeliveryError;

/// JSON-RPC client for one Ethereum chain.
#[derive(Clone)]
pub struct AlloyNode {
	provider: RootProvider<Http<reqwest::Client>>,
}

impl AlloyNode {
	/// Creates a client for the HTTP endpoint at `rpc_url`.
	pub fn new(rpc_url: &str) -> Result<Self, DeliveryError> {
		let url = rpc_url
			.parse()
			.map_err(|e| DeliveryError::Configuration(format!("Invalid RPC URL: {}", e)))?;
		let provider = ProviderBuilder::new().on_http(url);
		Ok(Self { provider })
	}

	/// Returns the chain id the endpoint reports.
	pub async fn chain_id(&self) -> Result<u64, NodeError> {
		self.provider.get_chain_id().await.map_err(transport)
	}
}

fn transport(err: impl std::fmt::Display) -> NodeError {
	NodeError::Transport(err.to_string())
}

fn pending_snapshot(tx: &Transaction) -> PendingTxSnapshot {
	let tx_type = tx.inner.ty();
	let fees = match tx_type {
		LEGACY_TX_TYPE | ACCESS_LIST_TX_TYPE => {
			PendingFees::GasPrice(tx.inner.gas_price().unwrap_or_default())
		},
		_ => PendingFees::Dynamic {
			gas_tip_cap: tx.inner.max_priority_fee_per_gas().unwrap_or_default(),
			gas_fee_cap: tx.inner.max_fee_per_gas(),
		},
	};
	PendingTxSnapshot {
		nonce: tx.inner.nonce(),
		fees,
		tx_type,
	}
}

#[async_trait]
impl ReadsLogs for AlloyNode {
	async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>, NodeError> {
		let filter = Filter::new()
			.address(query.address)
			.event_signature(query.topic)
			.from_block(query.from_block)
			.to_block(query.to_block);
		self.provider.get_logs(&filter).await.map_err(transport)
	}
}

#[async_trait]
impl ReadsContractState for AlloyNode {
	async fn call(&self, to: Address, input: Bytes, block: Option<u64>) -> Result<Bytes, NodeError> {
		let request = TransactionRequest::default().to(to).input(input.into());
		let call = self.provider.call(&request);
		let call = match block {
			Some(number) => call.block(BlockId::number(number)),
			None => call,
		};
		call.await.map_err(transport)
	}
}

#[async_trait]
impl ReadsBlockNumber for AlloyNode {
	async fn block_number(&self) -> Result<u64, NodeError> {
		self.provider.get_block_number().await.map_err(transport)
	}
}

#[async_trait]
impl SuggestsGasPrice for AlloyNode {
	async fn suggest_gas_price(&self) -> Result<u128, NodeError> {
		self.provider.get_gas_price().await.map_err(transport)
	}
}

#[async_trait]
impl ReadsFeeHistory for AlloyNode {
	async fn fee_history(
		&self,
		block_count: u64,
		last_block: u64,
		reward_percentiles: &[f64],
	) -> Result<FeeHistory, NodeError> {
		self.provider
			.get_fee_history(
				block_count,
				BlockNumberOrTag::Number(last_block),
				reward_percentiles,
			)
			.await
			.map_err(transport)
	}
}

#[async_trait]
impl ReadsPendingTransactions for AlloyNode {
	async fn pending_transactions_from(
		&self,
		sender: Address,
	) -> Result<Vec<PendingTxSnapshot>, NodeError> {
		let content = self
			.provider
			.txpool_content_from(sender)
			.await
			.map_err(transport)?;
		Ok(content.pending.values().map(pending_snapshot).collect())
	}
}

#[async_trait]
impl ReadsTransactions for AlloyNode {
	async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<ReceiptSummary>, NodeError> {
		let receipt = self
			.provider
			.get_transaction_receipt(hash)
			.await
			.map_err(transport)?;

		let Some(receipt) = receipt else {
			return Ok(None);
		};
		// Pending-block receipts carry no block number yet
		let Some(block_number) = receipt.block_number else {
			return Ok(None);
		};
		Ok(Some(ReceiptSummary {
			tx_hash: receipt.transaction_hash,
			block_number,
			success: receipt.status(),
			gas_used: u64::try_from(receipt.gas_used).unwrap_or(u64::MAX),
		}))
	}

	async fn transaction_by_hash(&self, hash: TxHash) -> Result<Option<TxSnapshot>, NodeError> {
		let tx = self
			.provider
			.get_transaction_by_hash(hash)
			.await
			.map_err(transport)?;

		Ok(tx.map(|tx| {
			let tx_type = tx.inner.ty();
			let block_number = tx.block_number;
			let from = tx.from;
			TxSnapshot {
				hash,
				tx_type,
				request: tx.into_request().from(from),
				block_number,
			}
		}))
	}

	async fn pending_nonce(&self, address: Address) -> Result<u64, NodeError> {
		self.provider
			.get_transaction_count(address)
			.pending()
			.await
			.map_err(transport)
	}

	async fn revert_data(&self, hash: TxHash, block_number: u64) -> Result<Option<Bytes>, NodeError> {
		let Some(tx) = self
			.provider
			.get_transaction_by_hash(hash)
			.await
			.map_err(transport)?
		else {
			return Ok(None);
		};

		let from = tx.from;
		let mut request = tx.into_request().from(from);
		// Replay without pricing so the parent block's base fee cannot reject it
		request.nonce = None;
		request.gas_price = None;
		request.max_fee_per_gas = None;
		request.max_priority_fee_per_gas = None;

		let parent = block_number.saturating_sub(1);
		match self.provider.call(&request).block(BlockId::number(parent)).await {
			Ok(_) => Ok(None),
			Err(RpcError::ErrorResp(payload)) => Ok(payload.as_revert_data()),
			Err(e) => Err(transport(e)),
		}
	}
}

#[async_trait]
impl SubmitsTransactions for AlloyNode {
	async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, NodeError> {
		let pending = self
			.provider
			.send_raw_transaction(raw)
			.await
			.map_err(transport)?;
		Ok(*pending.tx_hash())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_invalid_url_rejected() {
		assert!(matches!(
			AlloyNode::new("not a url"),
			Err(DeliveryError::Configuration(_))
		));
		assert!(AlloyNode::new("http://localhost:8545").is_ok());
	}
}
