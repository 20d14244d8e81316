//! Common types module for the Ethereum relayer adapter.
//!
//! This module defines the data model shared by packet discovery, fee
//! computation and transaction delivery, together with the node capability
//! traits those components are written against. Keeping the traits here lets
//! every component be exercised against an in-memory node without a network.

/// Cancellation and deadline propagation for network-facing operations.
pub mod cancel;
/// Gas pricing types: pending transaction snapshots, fee bounds and results.
pub mod fees;
/// Node capability traits and the transport-neutral types they exchange.
pub mod node;
/// Packet and checkpoint types produced by packet discovery.
pub mod packet;
/// Secure string type for private keys.
pub mod secret_string;
/// Utility functions for hex formatting.
pub mod utils;

/// In-memory node used by tests across the workspace.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export all types for convenient access
pub use cancel::*;
pub use fees::*;
pub use node::*;
pub use packet::*;
pub use secret_string::SecretString;
pub use utils::{decode_hex, truncate_id, with_0x_prefix, without_0x_prefix};
