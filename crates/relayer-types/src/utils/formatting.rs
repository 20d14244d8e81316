//! String formatting utilities.
//!
//! Hex prefix management and truncation of long identifiers for log output.

/// Truncates a hex identifier for display.
///
/// Keeps the `0x` prefix (when present) plus the first 8 hex digits.
pub fn truncate_id(id: &str) -> String {
	let body = without_0x_prefix(id);
	let prefix = &id[..id.len() - body.len()];
	if body.len() <= 8 {
		id.to_string()
	} else {
		format!("{}{}..", prefix, &body[..8])
	}
}

/// Adds "0x" prefix to a hex string if it doesn't already have one.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.starts_with("0x") || hex_str.starts_with("0X") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Removes "0x" prefix from a hex string if present.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Decodes a hex string with or without the "0x" prefix.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, hex::FromHexError> {
	hex::decode(without_0x_prefix(hex_str.trim()))
}
