//! Account module for the Ethereum relayer adapter.
//!
//! The relayer never handles key material beyond this boundary: delivery
//! hands a complete transaction request to an `AccountInterface` and gets
//! back the signed, EIP-2718 encoded bytes ready for broadcast.

use alloy_primitives::{Address, Bytes};
use alloy_rpc_types::TransactionRequest;
use async_trait::async_trait;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when a cryptographic key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

/// Trait defining the interface for signing accounts.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// The address transactions are sent from.
	fn address(&self) -> Address;

	/// The chain id signatures are bound to.
	fn chain_id(&self) -> u64;

	/// Signs a fully populated transaction request.
	///
	/// Returns the EIP-2718 encoding of the signed transaction.
	async fn sign_transaction(&self, tx: TransactionRequest) -> Result<Bytes, AccountError>;
}
