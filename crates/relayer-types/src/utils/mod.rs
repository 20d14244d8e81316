//! Utility functions for hex handling and display formatting.

pub mod formatting;

pub use formatting::{decode_hex, truncate_id, with_0x_prefix, without_0x_prefix};
