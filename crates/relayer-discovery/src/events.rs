//! Packet event and handler ABI of the IBC messaging contract.

use crate::DiscoveryError;
use alloy_rpc_types::Log;
use alloy_sol_types::{sol, SolEvent};
use relayer_config::PathConfig;
use relayer_types::{Height, PacketInfo};

sol! {
	struct HeightData {
		uint64 revision_number;
		uint64 revision_height;
	}

	struct Packet {
		uint64 sequence;
		string source_port;
		string source_channel;
		string destination_port;
		string destination_channel;
		bytes data;
		HeightData timeout_height;
		uint64 timeout_timestamp;
	}

	struct ChannelCounterparty {
		string port_id;
		string channel_id;
	}

	struct ChannelData {
		uint8 state;
		uint8 ordering;
		ChannelCounterparty counterparty;
		string[] connection_hops;
		string version;
		uint64 upgrade_sequence;
	}

	/// Emitted by the handler when a packet is sent.
	event SendPacket(
		uint64 sequence,
		string sourcePort,
		string sourceChannel,
		HeightData timeoutHeight,
		uint64 timeoutTimestamp,
		bytes data
	);

	/// Emitted by the handler when a packet is received.
	event RecvPacket(Packet packet);

	/// Emitted when the receiving application writes an acknowledgement.
	event WriteAcknowledgement(
		string destinationPortId,
		string destinationChannel,
		uint64 sequence,
		bytes acknowledgement
	);

	function getCommitment(bytes32 hashedPath) external view returns (bytes32 commitment);

	function getChannel(string portId, string channelId)
		external
		view
		returns (ChannelData channel, bool found);
}

/// `ChannelData.state` of an open channel.
pub const CHANNEL_STATE_OPEN: u8 = 3;

fn event_height(log: &Log) -> Result<u64, DiscoveryError> {
	log.block_number
		.ok_or_else(|| DiscoveryError::Decode("log without block number".to_string()))
}

impl From<HeightData> for Height {
	fn from(height: HeightData) -> Self {
		Height::new(height.revision_number, height.revision_height)
	}
}

/// Decodes a `SendPacket` log. Destination identifiers come from `path`.
pub fn decode_send_packet(log: &Log, path: &PathConfig) -> Result<PacketInfo, DiscoveryError> {
	let event = SendPacket::decode_log_data(log.data(), true)
		.map_err(|e| DiscoveryError::Decode(format!("SendPacket: {}", e)))?;
	Ok(PacketInfo {
		sequence: event.sequence,
		source_port: event.sourcePort,
		source_channel: event.sourceChannel,
		destination_port: path.counterparty_port_id.clone(),
		destination_channel: path.counterparty_channel_id.clone(),
		data: event.data,
		timeout_height: event.timeoutHeight.into(),
		timeout_timestamp: event.timeoutTimestamp,
		acknowledgement: None,
		event_height: event_height(log)?,
	})
}

/// Decodes a `RecvPacket` log.
pub fn decode_recv_packet(log: &Log) -> Result<PacketInfo, DiscoveryError> {
	let packet = RecvPacket::decode_log_data(log.data(), true)
		.map_err(|e| DiscoveryError::Decode(format!("RecvPacket: {}", e)))?
		.packet;
	Ok(PacketInfo {
		sequence: packet.sequence,
		source_port: packet.source_port,
		source_channel: packet.source_channel,
		destination_port: packet.destination_port,
		destination_channel: packet.destination_channel,
		data: packet.data,
		timeout_height: packet.timeout_height.into(),
		timeout_timestamp: packet.timeout_timestamp,
		acknowledgement: None,
		event_height: event_height(log)?,
	})
}

pub fn decode_write_acknowledgement(log: &Log) -> Result<WriteAcknowledgement, DiscoveryError> {
	WriteAcknowledgement::decode_log_data(log.data(), true)
		.map_err(|e| DiscoveryError::Decode(format!("WriteAcknowledgement: {}", e)))
}
