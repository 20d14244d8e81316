//! Storage module for the Ethereum relayer adapter.
//!
//! This module provides a small key/value abstraction with file-based and
//! in-memory backends, and the typed checkpoint store packet discovery
//! persists its per-direction cursors through.

use async_trait::async_trait;
use thiserror::Error;

mod checkpoint;

pub use checkpoint::CheckpointStore;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// A stored value could not be interpreted.
	#[error("Corrupt record '{key}': {reason}")]
	Corrupt { key: String, reason: String },
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
}

/// Trait defining the low-level interface for storage backends.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, replacing any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}
