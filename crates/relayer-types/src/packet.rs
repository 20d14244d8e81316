//! Packet and checkpoint types.
//!
//! A `PacketInfo` is built from one packet-lifecycle event and lives only as
//! long as the scan that produced it. A `Direction` names which of the two
//! persisted checkpoints a scan reads and advances.

use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which event stream a checkpoint tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
	/// Packets emitted by this chain's messaging contract.
	Sent,
	/// Packets received (and acknowledged) on this chain.
	Received,
}

impl Direction {
	/// Returns the storage key for this direction's checkpoint record.
	pub fn as_str(&self) -> &'static str {
		match self {
			Direction::Sent => "send",
			Direction::Received => "recv",
		}
	}

	/// Returns both directions.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Sent, Self::Received].into_iter()
	}
}

impl fmt::Display for Direction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Timeout height of a packet on the counterparty chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Height {
	pub revision_number: u64,
	pub revision_height: u64,
}

impl Height {
	pub fn new(revision_number: u64, revision_height: u64) -> Self {
		Self {
			revision_number,
			revision_height,
		}
	}

	/// Returns true when neither component is set.
	pub fn is_zero(&self) -> bool {
		self.revision_number == 0 && self.revision_height == 0
	}
}

impl fmt::Display for Height {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}-{}", self.revision_number, self.revision_height)
	}
}

/// A cross-chain packet discovered from an on-chain event.
///
/// Send events do not carry the destination identifiers, so for sent packets
/// `destination_port`/`destination_channel` come from the configured path.
/// `acknowledgement` is only set for received packets whose acknowledgement
/// has been written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketInfo {
	pub sequence: u64,
	pub source_port: String,
	pub source_channel: String,
	pub destination_port: String,
	pub destination_channel: String,
	pub data: Bytes,
	pub timeout_height: Height,
	pub timeout_timestamp: u64,
	pub acknowledgement: Option<Bytes>,
	/// Block height of the event this packet was decoded from.
	pub event_height: u64,
}

impl PacketInfo {
	/// Returns a copy of the packet with the acknowledgement attached.
	pub fn with_acknowledgement(mut self, acknowledgement: Bytes) -> Self {
		self.acknowledgement = Some(acknowledgement);
		self
	}
}

/// Returns the lowest event height among the given packets.
pub fn earliest_event_height(packets: &[PacketInfo]) -> Option<u64> {
	packets.iter().map(|p| p.event_height).min()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn packet(sequence: u64, event_height: u64) -> PacketInfo {
		PacketInfo {
			sequence,
			source_port: "transfer".to_string(),
			source_channel: "channel-0".to_string(),
			destination_port: "transfer".to_string(),
			destination_channel: "channel-1".to_string(),
			data: Bytes::from_static(b"payload"),
			timeout_height: Height::new(0, 1000),
			timeout_timestamp: 0,
			acknowledgement: None,
			event_height,
		}
	}

	#[test]
	fn test_direction_keys() {
		assert_eq!(Direction::Sent.as_str(), "send");
		assert_eq!(Direction::Received.as_str(), "recv");
		assert_eq!(Direction::all().count(), 2);
	}

	#[test]
	fn test_earliest_event_height() {
		assert_eq!(earliest_event_height(&[]), None);
		let packets = vec![packet(1, 40), packet(2, 12), packet(3, 77)];
		assert_eq!(earliest_event_height(&packets), Some(12));
	}

	#[test]
	fn test_with_acknowledgement() {
		let p = packet(5, 10).with_acknowledgement(Bytes::from_static(b"ok"));
		assert_eq!(p.acknowledgement, Some(Bytes::from_static(b"ok")));
	}
}
