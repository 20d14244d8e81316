//! Windowed packet scanning with persisted checkpoints.

use crate::commitment::packet_commitment_key;
use crate::events::{
	decode_recv_packet, decode_send_packet, decode_write_acknowledgement, getChannelCall,
	getCommitmentCall, RecvPacket, SendPacket, WriteAcknowledgement, CHANNEL_STATE_OPEN,
};
use crate::{Counterparty, DiscoveryError};
use alloy_primitives::{Address, Bytes, B256};
use alloy_rpc_types::Log;
use alloy_sol_types::{SolCall, SolEvent};
use relayer_config::PathConfig;
use relayer_storage::CheckpointStore;
use relayer_types::{
	earliest_event_height, CancelToken, Direction, LogQuery, PacketInfo, ReadsContractState,
	ReadsLogs,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::instrument;

/// Splits `[from, to]` into contiguous inclusive windows of at most
/// `blocks_per_query` blocks. An empty range yields no windows.
pub fn scan_windows(from: u64, to: u64, blocks_per_query: u64) -> Vec<(u64, u64)> {
	let size = blocks_per_query.max(1);
	let mut windows = Vec::new();
	if from > to {
		return windows;
	}

	let mut start = from;
	loop {
		let end = start.saturating_add(size - 1).min(to);
		windows.push((start, end));
		if end >= to {
			break;
		}
		start = end + 1;
	}
	windows
}

/// Keeps only the packets whose sequence is in `sequences`.
fn retain_sequences(packets: Vec<PacketInfo>, sequences: &[u64]) -> Vec<PacketInfo> {
	let keep: HashSet<u64> = sequences.iter().copied().collect();
	packets
		.into_iter()
		.filter(|p| keep.contains(&p.sequence))
		.collect()
}

/// Finds packets and acknowledgements on this chain that still need relaying.
///
/// Each direction has its own checkpoint: the lowest height not yet fully
/// scanned. A scan covers `[checkpoint, target_height]` and then moves the
/// checkpoint to the earliest event that is still unresolved, or past the
/// target when nothing is. Any failure leaves the checkpoint untouched.
pub struct PacketSyncEngine<N> {
	node: Arc<N>,
	ibc_address: Address,
	path: PathConfig,
	blocks_per_query: u64,
	checkpoints: CheckpointStore,
	/// Set once the channel has been seen open; cleared by invalidation.
	channel_open: AtomicBool,
}

impl<N: ReadsLogs + ReadsContractState> PacketSyncEngine<N> {
	pub fn new(
		node: Arc<N>,
		ibc_address: Address,
		path: PathConfig,
		blocks_per_query: u64,
		checkpoints: CheckpointStore,
	) -> Self {
		Self {
			node,
			ibc_address,
			path,
			blocks_per_query: blocks_per_query.max(1),
			checkpoints,
			channel_open: AtomicBool::new(false),
		}
	}

	pub fn path(&self) -> &PathConfig {
		&self.path
	}

	pub fn checkpoints(&self) -> &CheckpointStore {
		&self.checkpoints
	}

	/// Fetches logs with `topic` from the handler over `[from, to]`, one
	/// query per window, in window order.
	async fn scan_logs(
		&self,
		ctx: &CancelToken,
		topic: B256,
		from: u64,
		to: u64,
	) -> Result<Vec<Log>, DiscoveryError> {
		let mut logs = Vec::new();
		for (from_block, to_block) in scan_windows(from, to, self.blocks_per_query) {
			let query = LogQuery {
				address: self.ibc_address,
				topic,
				from_block,
				to_block,
			};
			let window = ctx.guard(self.node.get_logs(&query)).await?;
			tracing::debug!(from_block, to_block, count = window.len(), "Scanned log window");
			logs.extend(window);
		}
		Ok(logs)
	}

	/// Packets sent on the configured channel whose commitment still exists.
	#[instrument(skip_all, fields(from_block = from, to_block = to))]
	pub async fn committed_sent_packets(
		&self,
		ctx: &CancelToken,
		from: u64,
		to: u64,
	) -> Result<Vec<PacketInfo>, DiscoveryError> {
		let logs = self.scan_logs(ctx, SendPacket::SIGNATURE_HASH, from, to).await?;

		let mut packets = Vec::new();
		for log in &logs {
			let packet = decode_send_packet(log, &self.path)?;
			if packet.source_port != self.path.port_id || packet.source_channel != self.path.channel_id {
				continue;
			}
			packets.push(packet);
		}

		let mut committed = Vec::with_capacity(packets.len());
		for packet in packets {
			let commitment = self.packet_commitment(ctx, packet.sequence, to).await?;
			if commitment.is_zero() {
				tracing::debug!(sequence = packet.sequence, "Packet already resolved on-chain");
				continue;
			}
			committed.push(packet);
		}
		Ok(committed)
	}

	/// Reads the stored commitment of sent packet `sequence` at `height`.
	pub async fn packet_commitment(
		&self,
		ctx: &CancelToken,
		sequence: u64,
		height: u64,
	) -> Result<B256, DiscoveryError> {
		let key = packet_commitment_key(&self.path.port_id, &self.path.channel_id, sequence);
		let input = getCommitmentCall { hashedPath: key }.abi_encode();
		let output = ctx
			.guard(self.node.call(self.ibc_address, Bytes::from(input), Some(height)))
			.await?;
		let decoded = getCommitmentCall::abi_decode_returns(&output, true)
			.map_err(|e| DiscoveryError::Decode(format!("getCommitment: {}", e)))?;
		Ok(decoded.commitment)
	}

	/// Packets received on the configured channel, joined with the
	/// acknowledgement written for each.
	///
	/// Acknowledgements are searched from the height of the earliest receive
	/// found. Packets without an acknowledgement are left out.
	#[instrument(skip_all, fields(from_block = from, to_block = to))]
	pub async fn acknowledged_received_packets(
		&self,
		ctx: &CancelToken,
		from: u64,
		to: u64,
	) -> Result<Vec<PacketInfo>, DiscoveryError> {
		let logs = self.scan_logs(ctx, RecvPacket::SIGNATURE_HASH, from, to).await?;
		let mut received = Vec::new();
		for log in &logs {
			let packet = decode_recv_packet(log)?;
			if packet.destination_port != self.path.port_id
				|| packet.destination_channel != self.path.channel_id
			{
				continue;
			}
			received.push(packet);
		}

		let Some(ack_from) = earliest_event_height(&received) else {
			return Ok(Vec::new());
		};

		let logs = self
			.scan_logs(ctx, WriteAcknowledgement::SIGNATURE_HASH, ack_from, to)
			.await?;
		let mut acks = HashMap::new();
		for log in &logs {
			let ack = decode_write_acknowledgement(log)?;
			if ack.destinationPortId != self.path.port_id
				|| ack.destinationChannel != self.path.channel_id
			{
				continue;
			}
			acks.insert(ack.sequence, ack.acknowledgement);
		}
		if acks.is_empty() {
			return Ok(Vec::new());
		}

		Ok(received
			.into_iter()
			.filter_map(|packet| {
				let ack = acks.get(&packet.sequence)?.clone();
				Some(packet.with_acknowledgement(ack))
			})
			.collect())
	}

	/// Sent packets the counterparty has not received yet, scanned up to
	/// `target_height`. Advances the send checkpoint on success.
	#[instrument(skip_all, fields(target_height = target_height))]
	pub async fn unrelayed_packets(
		&self,
		ctx: &CancelToken,
		target_height: u64,
		counterparty: &dyn Counterparty,
	) -> Result<Vec<PacketInfo>, DiscoveryError> {
		let checkpoint = self.checkpoints.load(Direction::Sent).await?;
		if checkpoint > target_height {
			return Ok(Vec::new());
		}

		let candidates = self.committed_sent_packets(ctx, checkpoint, target_height).await?;
		let packets = if candidates.is_empty() {
			candidates
		} else {
			let sequences: Vec<u64> = candidates.iter().map(|p| p.sequence).collect();
			let height = ctx.guard(counterparty.latest_finalized_height(ctx)).await?;
			let unreceived = ctx
				.guard(counterparty.query_unreceived_packets(ctx, height, &sequences))
				.await?;
			retain_sequences(candidates, &unreceived)
		};

		self.advance(Direction::Sent, target_height, &packets).await?;
		Ok(packets)
	}

	/// Received packets whose acknowledgement the counterparty has not
	/// received yet, scanned up to `target_height`. Advances the receive
	/// checkpoint on success.
	#[instrument(skip_all, fields(target_height = target_height))]
	pub async fn unrelayed_acknowledgements(
		&self,
		ctx: &CancelToken,
		target_height: u64,
		counterparty: &dyn Counterparty,
	) -> Result<Vec<PacketInfo>, DiscoveryError> {
		let checkpoint = self.checkpoints.load(Direction::Received).await?;
		if checkpoint > target_height {
			return Ok(Vec::new());
		}

		let candidates = self
			.acknowledged_received_packets(ctx, checkpoint, target_height)
			.await?;
		let packets = if candidates.is_empty() {
			candidates
		} else {
			let sequences: Vec<u64> = candidates.iter().map(|p| p.sequence).collect();
			let height = ctx.guard(counterparty.latest_finalized_height(ctx)).await?;
			let unreceived = ctx
				.guard(counterparty.query_unreceived_acknowledgements(ctx, height, &sequences))
				.await?;
			retain_sequences(candidates, &unreceived)
		};

		self.advance(Direction::Received, target_height, &packets).await?;
		Ok(packets)
	}

	/// Moves the checkpoint to the earliest unresolved event, or past
	/// `target_height` when `remaining` is empty.
	async fn advance(
		&self,
		direction: Direction,
		target_height: u64,
		remaining: &[PacketInfo],
	) -> Result<u64, DiscoveryError> {
		let next = earliest_event_height(remaining).unwrap_or(target_height.saturating_add(1));
		tracing::debug!(%direction, next, unresolved = remaining.len(), "Scan complete");
		Ok(self.checkpoints.advance(direction, next).await?)
	}

	/// Whether the configured channel is open at `height` (latest when `None`).
	///
	/// An open result is cached on this engine until
	/// [`invalidate_channel_cache`](Self::invalidate_channel_cache) is called.
	pub async fn is_channel_open(
		&self,
		ctx: &CancelToken,
		height: Option<u64>,
	) -> Result<bool, DiscoveryError> {
		if self.channel_open.load(Ordering::Acquire) {
			return Ok(true);
		}

		let input = getChannelCall {
			portId: self.path.port_id.clone(),
			channelId: self.path.channel_id.clone(),
		}
		.abi_encode();
		let output = ctx
			.guard(self.node.call(self.ibc_address, Bytes::from(input), height))
			.await?;
		let decoded = getChannelCall::abi_decode_returns(&output, true)
			.map_err(|e| DiscoveryError::Decode(format!("getChannel: {}", e)))?;

		if !decoded.found {
			return Err(DiscoveryError::NotFound(format!(
				"channel {}/{}",
				self.path.port_id, self.path.channel_id
			)));
		}

		let open = decoded.channel.state == CHANNEL_STATE_OPEN;
		if open {
			self.channel_open.store(true, Ordering::Release);
		} else {
			tracing::debug!(state = decoded.channel.state, "Channel not open");
		}
		Ok(open)
	}

	/// Forgets a cached open channel so the next check queries the chain.
	pub fn invalidate_channel_cache(&self) {
		self.channel_open.store(false, Ordering::Release);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::events::tests::{ack_event, path, recv_event, send_event, to_log};
	use crate::events::{ChannelCounterparty, ChannelData};
	use alloy_primitives::{address, b256};
	use async_trait::async_trait;
	use relayer_storage::implementations::memory::MemoryStorage;
	use relayer_types::testing::MockNode;
	use relayer_types::NodeError;
	use std::sync::Mutex;

	const IBC: Address = address!("a51c1fc2f0d1a1b8494ed1fe312d7c3a78ed91c0");
	const LIVE: B256 = b256!("1111111111111111111111111111111111111111111111111111111111111111");

	#[derive(Default)]
	struct TestCounterparty {
		unreceived: Vec<u64>,
		fail: bool,
		queries: Mutex<Vec<(u64, Vec<u64>)>>,
	}

	impl TestCounterparty {
		fn with_unreceived(unreceived: Vec<u64>) -> Self {
			Self {
				unreceived,
				..Default::default()
			}
		}

		fn answer(&self, height: u64, sequences: &[u64]) -> Result<Vec<u64>, DiscoveryError> {
			self.queries.lock().unwrap().push((height, sequences.to_vec()));
			if self.fail {
				return Err(DiscoveryError::Counterparty("counterparty unreachable".into()));
			}
			Ok(sequences
				.iter()
				.copied()
				.filter(|s| self.unreceived.contains(s))
				.collect())
		}
	}

	#[async_trait]
	impl Counterparty for TestCounterparty {
		async fn latest_finalized_height(&self, _ctx: &CancelToken) -> Result<u64, DiscoveryError> {
			Ok(900)
		}

		async fn query_unreceived_packets(
			&self,
			_ctx: &CancelToken,
			height: u64,
			sequences: &[u64],
		) -> Result<Vec<u64>, DiscoveryError> {
			self.answer(height, sequences)
		}

		async fn query_unreceived_acknowledgements(
			&self,
			_ctx: &CancelToken,
			height: u64,
			sequences: &[u64],
		) -> Result<Vec<u64>, DiscoveryError> {
			self.answer(height, sequences)
		}
	}

	fn engine(node: &Arc<MockNode>, blocks_per_query: u64) -> PacketSyncEngine<MockNode> {
		let checkpoints = CheckpointStore::new(Arc::new(MemoryStorage::new()), 1000, 1000);
		PacketSyncEngine::new(node.clone(), IBC, path(), blocks_per_query, checkpoints)
	}

	fn set_commitment(node: &MockNode, sequence: u64, value: B256) {
		let key = packet_commitment_key("transfer", "channel-0", sequence);
		let input = getCommitmentCall { hashedPath: key }.abi_encode();
		node.set_call_response(IBC, Bytes::from(input), Bytes::copy_from_slice(value.as_slice()));
	}

	fn set_channel(node: &MockNode, state: u8, found: bool) {
		let input = getChannelCall {
			portId: "transfer".to_string(),
			channelId: "channel-0".to_string(),
		}
		.abi_encode();
		let channel = ChannelData {
			state,
			ordering: 1,
			counterparty: ChannelCounterparty {
				port_id: "transfer".to_string(),
				channel_id: "channel-7".to_string(),
			},
			connection_hops: vec!["connection-0".to_string()],
			version: "ics20-1".to_string(),
			upgrade_sequence: 0,
		};
		let output = getChannelCall::abi_encode_returns(&(channel, found));
		node.set_call_response(IBC, Bytes::from(input), Bytes::from(output));
	}

	#[test]
	fn test_scan_windows() {
		assert_eq!(
			scan_windows(1000, 3499, 1000),
			vec![(1000, 1999), (2000, 2999), (3000, 3499)]
		);
		assert_eq!(scan_windows(5, 5, 1000), vec![(5, 5)]);
		assert_eq!(scan_windows(0, 1999, 1000), vec![(0, 999), (1000, 1999)]);
		assert!(scan_windows(10, 9, 1000).is_empty());
		assert_eq!(scan_windows(1, 3, 0), vec![(1, 1), (2, 2), (3, 3)]);
	}

	#[tokio::test]
	async fn test_scan_issues_one_query_per_window() {
		let node = Arc::new(MockNode::new());
		let engine = engine(&node, 1000);
		let counterparty = TestCounterparty::default();

		let packets = engine
			.unrelayed_packets(&CancelToken::never(), 3499, &counterparty)
			.await
			.unwrap();
		assert!(packets.is_empty());

		let ranges: Vec<(u64, u64)> = node
			.log_queries()
			.iter()
			.map(|q| {
				assert_eq!(q.address, IBC);
				assert_eq!(q.topic, SendPacket::SIGNATURE_HASH);
				(q.from_block, q.to_block)
			})
			.collect();
		assert_eq!(ranges, vec![(1000, 1999), (2000, 2999), (3000, 3499)]);
		assert_eq!(engine.checkpoints().load(Direction::Sent).await.unwrap(), 3500);
		assert!(counterparty.queries.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_sent_packets_filtered_and_checkpoint_held() {
		let node = Arc::new(MockNode::new());
		node.push_log(to_log(IBC, &send_event(1, "channel-0"), 1200));
		node.push_log(to_log(IBC, &send_event(2, "channel-0"), 1500));
		node.push_log(to_log(IBC, &send_event(3, "channel-9"), 1600));
		node.push_log(to_log(IBC, &send_event(4, "channel-0"), 1800));
		set_commitment(&node, 1, LIVE);
		set_commitment(&node, 2, LIVE);
		set_commitment(&node, 4, B256::ZERO);

		let engine = engine(&node, 500);
		let counterparty = TestCounterparty::with_unreceived(vec![2, 4]);
		let packets = engine
			.unrelayed_packets(&CancelToken::never(), 2000, &counterparty)
			.await
			.unwrap();

		assert_eq!(packets.len(), 1);
		assert_eq!(packets[0].sequence, 2);
		assert_eq!(packets[0].destination_channel, "channel-7");
		assert_eq!(*counterparty.queries.lock().unwrap(), vec![(900, vec![1, 2])]);

		// Commitments are read at the target height
		assert!(node.call_requests().iter().all(|(to, _, block)| *to == IBC && *block == Some(2000)));
		assert_eq!(node.call_requests().len(), 3);

		assert_eq!(engine.checkpoints().load(Direction::Sent).await.unwrap(), 1500);
	}

	#[tokio::test]
	async fn test_checkpoint_never_moves_backwards() {
		let node = Arc::new(MockNode::new());
		let engine = engine(&node, 1000);
		let counterparty = TestCounterparty::default();
		let ctx = CancelToken::never();

		engine.unrelayed_packets(&ctx, 3499, &counterparty).await.unwrap();
		let queries = node.log_queries().len();

		let packets = engine.unrelayed_packets(&ctx, 3000, &counterparty).await.unwrap();
		assert!(packets.is_empty());
		assert_eq!(node.log_queries().len(), queries);
		assert_eq!(engine.checkpoints().load(Direction::Sent).await.unwrap(), 3500);

		engine.unrelayed_packets(&ctx, 3600, &counterparty).await.unwrap();
		assert_eq!(node.log_queries().last().map(|q| q.from_block), Some(3500));
		assert_eq!(engine.checkpoints().load(Direction::Sent).await.unwrap(), 3601);
	}

	#[tokio::test]
	async fn test_log_failure_leaves_checkpoint() {
		let node = Arc::new(MockNode::new());
		node.fail_logs(Some(NodeError::Transport("rate limited".into())));
		let engine = engine(&node, 1000);

		let err = engine
			.unrelayed_packets(&CancelToken::never(), 5000, &TestCounterparty::default())
			.await
			.unwrap_err();

		assert!(matches!(err, DiscoveryError::Transport(_)));
		assert_eq!(engine.checkpoints().load(Direction::Sent).await.unwrap(), 1000);
	}

	#[tokio::test]
	async fn test_commitment_failure_leaves_checkpoint() {
		let node = Arc::new(MockNode::new());
		node.push_log(to_log(IBC, &send_event(1, "channel-0"), 1200));
		let engine = engine(&node, 1000);

		// No commitment response configured, so the read fails
		let err = engine
			.unrelayed_packets(&CancelToken::never(), 2000, &TestCounterparty::default())
			.await
			.unwrap_err();

		assert!(matches!(err, DiscoveryError::Transport(_)));
		assert_eq!(engine.checkpoints().load(Direction::Sent).await.unwrap(), 1000);
	}

	#[tokio::test]
	async fn test_counterparty_failure_leaves_checkpoint() {
		let node = Arc::new(MockNode::new());
		node.push_log(to_log(IBC, &send_event(1, "channel-0"), 1200));
		set_commitment(&node, 1, LIVE);
		let engine = engine(&node, 1000);
		let counterparty = TestCounterparty {
			fail: true,
			..Default::default()
		};

		let err = engine
			.unrelayed_packets(&CancelToken::never(), 2000, &counterparty)
			.await
			.unwrap_err();

		assert!(matches!(err, DiscoveryError::Counterparty(_)));
		assert_eq!(engine.checkpoints().load(Direction::Sent).await.unwrap(), 1000);
	}

	#[tokio::test]
	async fn test_cancelled_scan_leaves_checkpoint() {
		let node = Arc::new(MockNode::new());
		let engine = engine(&node, 1000);
		let (handle, ctx) = CancelToken::new();
		handle.cancel();

		let err = engine
			.unrelayed_packets(&ctx, 5000, &TestCounterparty::default())
			.await
			.unwrap_err();

		assert!(matches!(err, DiscoveryError::Cancelled(_)));
		assert!(node.log_queries().is_empty());
		assert_eq!(engine.checkpoints().load(Direction::Sent).await.unwrap(), 1000);
	}

	#[tokio::test]
	async fn test_acknowledgements_joined_from_first_receive() {
		let node = Arc::new(MockNode::new());
		node.push_log(to_log(IBC, &recv_event(5, "channel-0"), 2000));
		node.push_log(to_log(IBC, &recv_event(6, "channel-0"), 2100));
		node.push_log(to_log(IBC, &recv_event(7, "channel-3"), 2150));
		node.push_log(to_log(IBC, &ack_event(5, "channel-0"), 2000));
		node.push_log(to_log(IBC, &ack_event(6, "channel-0"), 2300));

		let engine = engine(&node, 1000);
		let counterparty = TestCounterparty::with_unreceived(vec![6]);
		let packets = engine
			.unrelayed_acknowledgements(&CancelToken::never(), 2500, &counterparty)
			.await
			.unwrap();

		assert_eq!(packets.len(), 1);
		assert_eq!(packets[0].sequence, 6);
		assert_eq!(packets[0].acknowledgement, Some(Bytes::from_static(b"ack-6")));
		assert_eq!(packets[0].event_height, 2100);

		let ack_queries: Vec<(u64, u64)> = node
			.log_queries()
			.iter()
			.filter(|q| q.topic == WriteAcknowledgement::SIGNATURE_HASH)
			.map(|q| (q.from_block, q.to_block))
			.collect();
		assert_eq!(ack_queries, vec![(2000, 2500)]);
		assert_eq!(*counterparty.queries.lock().unwrap(), vec![(900, vec![5, 6])]);
		assert_eq!(engine.checkpoints().load(Direction::Received).await.unwrap(), 2100);
	}

	#[tokio::test]
	async fn test_receives_without_acknowledgements_yield_nothing() {
		let node = Arc::new(MockNode::new());
		node.push_log(to_log(IBC, &recv_event(5, "channel-0"), 2000));

		let engine = engine(&node, 1000);
		let packets = engine
			.unrelayed_acknowledgements(&CancelToken::never(), 2500, &TestCounterparty::default())
			.await
			.unwrap();

		assert!(packets.is_empty());
		assert_eq!(engine.checkpoints().load(Direction::Received).await.unwrap(), 2501);
		assert_eq!(engine.checkpoints().load(Direction::Sent).await.unwrap(), 1000);
	}

	#[tokio::test]
	async fn test_channel_open_is_cached_until_invalidated() {
		let node = Arc::new(MockNode::new());
		set_channel(&node, CHANNEL_STATE_OPEN, true);
		let engine = engine(&node, 1000);
		let ctx = CancelToken::never();

		assert!(engine.is_channel_open(&ctx, Some(10)).await.unwrap());
		assert!(engine.is_channel_open(&ctx, Some(11)).await.unwrap());
		assert_eq!(node.call_requests().len(), 1);

		engine.invalidate_channel_cache();
		assert!(engine.is_channel_open(&ctx, None).await.unwrap());
		assert_eq!(node.call_requests().len(), 2);
	}

	#[tokio::test]
	async fn test_channel_not_open_is_not_cached() {
		let node = Arc::new(MockNode::new());
		set_channel(&node, 2, true);
		let engine = engine(&node, 1000);
		let ctx = CancelToken::never();

		assert!(!engine.is_channel_open(&ctx, None).await.unwrap());
		assert!(!engine.is_channel_open(&ctx, None).await.unwrap());
		assert_eq!(node.call_requests().len(), 2);
	}

	#[tokio::test]
	async fn test_missing_channel_is_not_found() {
		let node = Arc::new(MockNode::new());
		set_channel(&node, 0, false);
		let engine = engine(&node, 1000);

		let err = engine.is_channel_open(&CancelToken::never(), None).await.unwrap_err();
		assert!(matches!(err, DiscoveryError::NotFound(_)));
	}
}
