//! Local private-key account.

use crate::{AccountError, AccountInterface};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use relayer_types::SecretString;

/// Signs with a private key held in process memory.
pub struct LocalAccount {
	wallet: EthereumWallet,
	address: Address,
	chain_id: u64,
}

impl LocalAccount {
	/// Creates an account from a hex private key (with or without `0x`).
	pub fn new(private_key: &SecretString, chain_id: u64) -> Result<Self, AccountError> {
		let signer: PrivateKeySigner = private_key.with_exposed(|key| {
			key.trim()
				.parse()
				.map_err(|_| AccountError::InvalidKey("Invalid private key format".to_string()))
		})?;
		let signer = signer.with_chain_id(Some(chain_id));
		let address = signer.address();

		Ok(Self {
			wallet: EthereumWallet::from(signer),
			address,
			chain_id,
		})
	}
}

#[async_trait]
impl AccountInterface for LocalAccount {
	fn address(&self) -> Address {
		self.address
	}

	fn chain_id(&self) -> u64 {
		self.chain_id
	}

	async fn sign_transaction(&self, tx: TransactionRequest) -> Result<Bytes, AccountError> {
		let tx = tx.with_from(self.address).with_chain_id(self.chain_id);
		let envelope = tx
			.build(&self.wallet)
			.await
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		Ok(envelope.encoded_2718().into())
	}
}
