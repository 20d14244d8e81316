//! Assembles an [`EthereumChain`] from configuration.

use crate::{ChainError, EthereumChain};
use relayer_account::implementations::local::LocalAccount;
use relayer_account::AccountInterface;
use relayer_config::{Config, StorageBackend};
use relayer_delivery::implementations::evm::alloy::AlloyNode;
use relayer_delivery::{DeliveryNode, TxLifecycleManager};
use relayer_discovery::PacketSyncEngine;
use relayer_revert::ErrorRepository;
use relayer_storage::implementations::file::FileStorage;
use relayer_storage::implementations::memory::MemoryStorage;
use relayer_storage::{CheckpointStore, StorageInterface};
use relayer_types::{ReadsContractState, ReadsLogs};
use std::sync::Arc;

/// Builder for an [`EthereumChain`].
pub struct ChainBuilder {
	config: Config,
}

impl ChainBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the adapter against the configured JSON-RPC endpoint.
	pub fn build(self) -> Result<EthereumChain<AlloyNode>, ChainError> {
		let node = AlloyNode::new(&self.config.chain.rpc_url)?;
		self.build_with_node(Arc::new(node))
	}

	/// Builds the adapter on top of an existing node client.
	pub fn build_with_node<N>(self, node: Arc<N>) -> Result<EthereumChain<N>, ChainError>
	where
		N: DeliveryNode + ReadsLogs + ReadsContractState,
	{
		let config = self.config;

		let backend: Arc<dyn StorageInterface> = match config.storage.backend {
			StorageBackend::File => {
				let dir = config.checkpoint_dir();
				tracing::info!(component = "storage", implementation = "file", path = %dir.display(), "Loaded");
				Arc::new(FileStorage::new(dir))
			},
			StorageBackend::Memory => {
				tracing::info!(component = "storage", implementation = "memory", "Loaded");
				Arc::new(MemoryStorage::new())
			},
		};
		let checkpoints = CheckpointStore::new(
			backend,
			config.sync.initial_send_checkpoint,
			config.sync.initial_recv_checkpoint,
		);

		let errors = Arc::new(ErrorRepository::from_artifact_dirs(&config.revert.artifact_dirs)?);
		tracing::info!(component = "revert", errors = errors.len(), "Loaded");

		let account = LocalAccount::new(&config.account.private_key, config.chain.chain_id)
			.map_err(|e| ChainError::Config(format!("Failed to create account: {}", e)))?;
		tracing::info!(component = "account", address = %account.address(), "Loaded");

		let delivery = TxLifecycleManager::new(
			node.clone(),
			Arc::new(account),
			errors.clone(),
			config.tx.clone(),
		);
		let sync = PacketSyncEngine::new(
			node.clone(),
			config.chain.ibc_address,
			config.sync.path.clone(),
			config.sync.blocks_per_query,
			checkpoints,
		);

		tracing::info!(
			chain_id = config.chain.chain_id,
			ibc_address = %config.chain.ibc_address,
			channel = %config.sync.path.channel_id,
			"Chain adapter ready"
		);

		Ok(EthereumChain {
			config,
			node,
			errors,
			delivery,
			sync,
		})
	}
}
