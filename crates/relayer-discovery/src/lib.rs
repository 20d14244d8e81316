//! Packet discovery module for the Ethereum relayer adapter.
//!
//! This module finds packets and acknowledgements that still need relaying
//! by scanning the messaging contract's event logs in bounded windows,
//! cross-checking live commitment state, and asking the counterparty chain
//! which sequences it has not yet received. Progress is kept in a persisted
//! per-direction checkpoint so scans resume where they left off.

use async_trait::async_trait;
use relayer_storage::StorageError;
use relayer_types::{CancelReason, CancelToken, NodeError};
use thiserror::Error;

pub mod commitment;
pub mod events;
mod sync;

pub use sync::{scan_windows, PacketSyncEngine};

/// Errors that can occur during packet discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
	/// RPC or network failure.
	#[error("Transport error: {0}")]
	Transport(String),
	/// Channel or other on-chain state that does not exist.
	#[error("Not found: {0}")]
	NotFound(String),
	/// A log or call result that does not match the expected ABI.
	#[error("Decode error: {0}")]
	Decode(String),
	/// Failure reported by the counterparty query capability.
	#[error("Counterparty error: {0}")]
	Counterparty(String),
	#[error("Checkpoint storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("{0}")]
	Cancelled(#[from] CancelReason),
}

impl From<NodeError> for DiscoveryError {
	fn from(err: NodeError) -> Self {
		match err {
			NodeError::Transport(msg) => DiscoveryError::Transport(msg),
			NodeError::InvalidResponse(msg) => DiscoveryError::Decode(msg),
			NodeError::Cancelled(reason) => DiscoveryError::Cancelled(reason),
		}
	}
}

/// Queries answered by the counterparty chain.
///
/// Supplied by the relayer framework driving this adapter.
#[async_trait]
pub trait Counterparty: Send + Sync {
	/// Latest counterparty height that is final.
	async fn latest_finalized_height(&self, ctx: &CancelToken) -> Result<u64, DiscoveryError>;

	/// Returns the subset of `sequences` the counterparty has not received,
	/// evaluated at `height`.
	async fn query_unreceived_packets(
		&self,
		ctx: &CancelToken,
		height: u64,
		sequences: &[u64],
	) -> Result<Vec<u64>, DiscoveryError>;

	/// Returns the subset of `sequences` whose acknowledgement the
	/// counterparty has not received, evaluated at `height`.
	async fn query_unreceived_acknowledgements(
		&self,
		ctx: &CancelToken,
		height: u64,
		sequences: &[u64],
	) -> Result<Vec<u64>, DiscoveryError>;
}
