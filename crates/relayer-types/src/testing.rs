//! In-memory node for tests.
//!
//! `MockNode` implements every node capability trait from programmable
//! state and records the requests it receives, so components can be
//! exercised and inspected without a JSON-RPC endpoint.

use crate::node::*;
use crate::PendingTxSnapshot;
use alloy_primitives::{keccak256, Address, Bytes, TxHash};
use alloy_rpc_types::{FeeHistory, Log};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct MockState {
	block_number: u64,
	logs: Vec<Log>,
	log_queries: Vec<LogQuery>,
	log_error: Option<NodeError>,
	call_responses: HashMap<(Address, Bytes), Bytes>,
	call_requests: Vec<(Address, Bytes, Option<u64>)>,
	call_error: Option<NodeError>,
	gas_price: u128,
	fee_history: HashMap<u64, FeeHistory>,
	fee_history_queries: Vec<u64>,
	pending: Vec<PendingTxSnapshot>,
	pending_queries: usize,
	receipts: HashMap<TxHash, VecDeque<Result<Option<ReceiptSummary>, NodeError>>>,
	receipt_queries: HashMap<TxHash, usize>,
	transactions: HashMap<TxHash, VecDeque<TxSnapshot>>,
	nonces: HashMap<Address, u64>,
	revert_data: HashMap<TxHash, Bytes>,
	sent: Vec<Bytes>,
	auto_receipt: Option<bool>,
}

/// Programmable in-memory implementation of the node capabilities.
#[derive(Default)]
pub struct MockNode {
	state: Mutex<MockState>,
}

/// Pops the front of a response queue, repeating the last entry forever.
fn next_response<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
	if queue.len() > 1 {
		queue.pop_front()
	} else {
		queue.front().cloned()
	}
}

impl MockNode {
	pub fn new() -> Self {
		Self::default()
	}

	fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		f(&mut state)
	}

	pub fn set_block_number(&self, block_number: u64) {
		self.with_state(|s| s.block_number = block_number);
	}

	pub fn push_log(&self, log: Log) {
		self.with_state(|s| s.logs.push(log));
	}

	pub fn fail_logs(&self, error: Option<NodeError>) {
		self.with_state(|s| s.log_error = error);
	}

	pub fn log_queries(&self) -> Vec<LogQuery> {
		self.with_state(|s| s.log_queries.clone())
	}

	pub fn set_call_response(&self, to: Address, input: Bytes, output: Bytes) {
		self.with_state(|s| {
			s.call_responses.insert((to, input), output);
		});
	}

	pub fn fail_calls(&self, error: Option<NodeError>) {
		self.with_state(|s| s.call_error = error);
	}

	pub fn call_requests(&self) -> Vec<(Address, Bytes, Option<u64>)> {
		self.with_state(|s| s.call_requests.clone())
	}

	pub fn set_gas_price(&self, gas_price: u128) {
		self.with_state(|s| s.gas_price = gas_price);
	}

	/// Sets the single-block fee history returned for `block`.
	pub fn set_fee_history(&self, block: u64, reward: u128, base_fee: u128) {
		let history = FeeHistory {
			oldest_block: block,
			base_fee_per_gas: vec![base_fee, base_fee],
			gas_used_ratio: vec![0.5],
			reward: Some(vec![vec![reward]]),
			..Default::default()
		};
		self.with_state(|s| {
			s.fee_history.insert(block, history);
		});
	}

	/// Blocks passed to `fee_history`, in request order.
	pub fn fee_history_queries(&self) -> Vec<u64> {
		self.with_state(|s| s.fee_history_queries.clone())
	}

	pub fn add_pending(&self, snapshot: PendingTxSnapshot) {
		self.with_state(|s| s.pending.push(snapshot));
	}

	pub fn pending_queries(&self) -> usize {
		self.with_state(|s| s.pending_queries)
	}

	/// Queues a receipt lookup result for `hash`.
	pub fn push_receipt(&self, hash: TxHash, result: Result<Option<ReceiptSummary>, NodeError>) {
		self.with_state(|s| s.receipts.entry(hash).or_default().push_back(result));
	}

	pub fn receipt_queries(&self, hash: TxHash) -> usize {
		self.with_state(|s| s.receipt_queries.get(&hash).copied().unwrap_or(0))
	}

	/// Queues a transaction lookup result for `tx.hash`.
	pub fn push_transaction(&self, tx: TxSnapshot) {
		self.with_state(|s| s.transactions.entry(tx.hash).or_default().push_back(tx));
	}

	pub fn set_nonce(&self, address: Address, nonce: u64) {
		self.with_state(|s| {
			s.nonces.insert(address, nonce);
		});
	}

	pub fn set_revert_data(&self, hash: TxHash, data: Bytes) {
		self.with_state(|s| {
			s.revert_data.insert(hash, data);
		});
	}

	/// Mines every transaction broadcast from now on in the next block, with
	/// the given status. `None` turns this off.
	pub fn auto_mine(&self, success: Option<bool>) {
		self.with_state(|s| s.auto_receipt = success);
	}

	/// Raw transactions broadcast so far.
	pub fn sent_transactions(&self) -> Vec<Bytes> {
		self.with_state(|s| s.sent.clone())
	}

	/// The hash the mock assigns to a broadcast raw transaction.
	pub fn hash_of(raw: &[u8]) -> TxHash {
		keccak256(raw)
	}
}

#[async_trait]
impl ReadsLogs for MockNode {
	async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>, NodeError> {
		self.with_state(|s| {
			s.log_queries.push(*query);
			if let Some(error) = &s.log_error {
				return Err(error.clone());
			}
			Ok(s.logs
				.iter()
				.filter(|log| {
					let height = log.block_number.unwrap_or_default();
					log.address() == query.address
						&& log.topics().first() == Some(&query.topic)
						&& height >= query.from_block
						&& height <= query.to_block
				})
				.cloned()
				.collect())
		})
	}
}

#[async_trait]
impl ReadsContractState for MockNode {
	async fn call(&self, to: Address, input: Bytes, block: Option<u64>) -> Result<Bytes, NodeError> {
		self.with_state(|s| {
			s.call_requests.push((to, input.clone(), block));
			if let Some(error) = &s.call_error {
				return Err(error.clone());
			}
			s.call_responses
				.get(&(to, input))
				.cloned()
				.ok_or_else(|| NodeError::Transport("execution reverted".to_string()))
		})
	}
}

#[async_trait]
impl ReadsBlockNumber for MockNode {
	async fn block_number(&self) -> Result<u64, NodeError> {
		Ok(self.with_state(|s| s.block_number))
	}
}

#[async_trait]
impl SuggestsGasPrice for MockNode {
	async fn suggest_gas_price(&self) -> Result<u128, NodeError> {
		Ok(self.with_state(|s| s.gas_price))
	}
}

#[async_trait]
impl ReadsFeeHistory for MockNode {
	async fn fee_history(
		&self,
		_block_count: u64,
		last_block: u64,
		_reward_percentiles: &[f64],
	) -> Result<FeeHistory, NodeError> {
		self.with_state(|s| {
			s.fee_history_queries.push(last_block);
			Ok(s.fee_history.get(&last_block).cloned().unwrap_or_else(|| FeeHistory {
				oldest_block: last_block,
				base_fee_per_gas: vec![0, 0],
				gas_used_ratio: vec![0.0],
				reward: Some(vec![vec![0]]),
				..Default::default()
			}))
		})
	}
}

#[async_trait]
impl ReadsPendingTransactions for MockNode {
	async fn pending_transactions_from(
		&self,
		_sender: Address,
	) -> Result<Vec<PendingTxSnapshot>, NodeError> {
		self.with_state(|s| {
			s.pending_queries += 1;
			Ok(s.pending.clone())
		})
	}
}

#[async_trait]
impl ReadsTransactions for MockNode {
	async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<ReceiptSummary>, NodeError> {
		self.with_state(|s| {
			*s.receipt_queries.entry(hash).or_default() += 1;
			match s.receipts.get_mut(&hash) {
				Some(queue) => next_response(queue).unwrap_or(Ok(None)),
				None => Ok(None),
			}
		})
	}

	async fn transaction_by_hash(&self, hash: TxHash) -> Result<Option<TxSnapshot>, NodeError> {
		self.with_state(|s| Ok(s.transactions.get_mut(&hash).and_then(next_response)))
	}

	async fn pending_nonce(&self, address: Address) -> Result<u64, NodeError> {
		Ok(self.with_state(|s| s.nonces.get(&address).copied().unwrap_or(0)))
	}

	async fn revert_data(&self, hash: TxHash, _block_number: u64) -> Result<Option<Bytes>, NodeError> {
		Ok(self.with_state(|s| s.revert_data.get(&hash).cloned()))
	}
}

#[async_trait]
impl SubmitsTransactions for MockNode {
	async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, NodeError> {
		let hash = Self::hash_of(raw);
		self.with_state(|s| {
			s.sent.push(Bytes::copy_from_slice(raw));
			if let Some(success) = s.auto_receipt {
				let receipt = ReceiptSummary {
					tx_hash: hash,
					block_number: s.block_number + 1,
					success,
					gas_used: 21_000,
				};
				s.receipts.entry(hash).or_default().push_back(Ok(Some(receipt)));
			}
		});
		Ok(hash)
	}
}
