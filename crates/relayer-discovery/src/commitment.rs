use alloy_primitives::{keccak256, B256};

/// Store path of a packet commitment.
pub fn packet_commitment_path(port_id: &str, channel_id: &str, sequence: u64) -> String {
	format!(
		"commitments/ports/{}/channels/{}/sequences/{}",
		port_id, channel_id, sequence
	)
}

/// Key under which the handler stores the commitment of a sent packet.
pub fn packet_commitment_key(port_id: &str, channel_id: &str, sequence: u64) -> B256 {
	keccak256(packet_commitment_path(port_id, channel_id, sequence).as_bytes())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_commitment_path() {
		assert_eq!(
			packet_commitment_path("transfer", "channel-0", 42),
			"commitments/ports/transfer/channels/channel-0/sequences/42"
		);
	}

	#[test]
	fn test_key_depends_on_every_component() {
		let key = packet_commitment_key("transfer", "channel-0", 1);
		assert_eq!(
			key,
			keccak256(b"commitments/ports/transfer/channels/channel-0/sequences/1")
		);
		assert_ne!(key, packet_commitment_key("transfer", "channel-0", 2));
		assert_ne!(key, packet_commitment_key("transfer", "channel-1", 1));
		assert_ne!(key, packet_commitment_key("other", "channel-0", 1));
	}
}
