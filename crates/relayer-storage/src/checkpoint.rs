use crate::{StorageError, StorageInterface};
use relayer_types::Direction;
use std::sync::Arc;

/// Typed access to the per-direction scan checkpoints of one chain.
///
/// A record holds the decimal string of the next unscanned height. A missing
/// record means the configured initial value, not zero.
#[derive(Clone)]
pub struct CheckpointStore {
	backend: Arc<dyn StorageInterface>,
	initial_send: u64,
	initial_recv: u64,
}

impl CheckpointStore {
	pub fn new(backend: Arc<dyn StorageInterface>, initial_send: u64, initial_recv: u64) -> Self {
		Self {
			backend,
			initial_send,
			initial_recv,
		}
	}

	/// The value used while no record has been persisted.
	pub fn initial(&self, direction: Direction) -> u64 {
		match direction {
			Direction::Sent => self.initial_send,
			Direction::Received => self.initial_recv,
		}
	}

	/// Reads the checkpoint for `direction`.
	pub async fn load(&self, direction: Direction) -> Result<u64, StorageError> {
		let key = direction.as_str();
		let bytes = match self.backend.get_bytes(key).await {
			Ok(bytes) => bytes,
			Err(StorageError::NotFound) => return Ok(self.initial(direction)),
			Err(e) => return Err(e),
		};

		let text = std::str::from_utf8(&bytes).map_err(|e| StorageError::Corrupt {
			key: key.to_string(),
			reason: e.to_string(),
		})?;
		text.trim().parse::<u64>().map_err(|e| StorageError::Corrupt {
			key: key.to_string(),
			reason: format!("'{}': {}", text.trim(), e),
		})
	}

	/// Persists `height` for `direction` and returns the value now stored.
	///
	/// A checkpoint never moves backwards: a lower height leaves the current
	/// value in place.
	pub async fn advance(&self, direction: Direction, height: u64) -> Result<u64, StorageError> {
		let current = self.load(direction).await?;
		if height < current {
			tracing::warn!(
				%direction,
				current,
				requested = height,
				"Refusing to move checkpoint backwards"
			);
			return Ok(current);
		}
		if height == current && self.backend.exists(direction.as_str()).await? {
			return Ok(current);
		}

		self.backend
			.set_bytes(direction.as_str(), height.to_string().into_bytes())
			.await?;
		tracing::info!(%direction, from = current, to = height, "Advanced checkpoint");
		Ok(height)
	}
}
