//! Cancellation context threaded through every network call.
//!
//! A `CancelToken` fires either when its `CancelHandle` is triggered or when
//! its optional deadline passes. Operations race each suspension point
//! against the token and surface a `CancelReason` instead of continuing.

use std::future::Future;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why an operation stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CancelReason {
	/// The caller triggered cancellation.
	#[error("operation cancelled")]
	Cancelled,
	/// The caller-supplied deadline passed.
	#[error("deadline exceeded")]
	DeadlineExceeded,
}

/// Triggers cancellation of every token cloned from its pair.
#[derive(Debug)]
pub struct CancelHandle {
	tx: watch::Sender<bool>,
}

impl CancelHandle {
	/// Fires the paired tokens. Idempotent.
	pub fn cancel(&self) {
		let _ = self.tx.send(true);
	}
}

/// Cancellation context accepted by network-facing operations.
#[derive(Debug, Clone)]
pub struct CancelToken {
	rx: watch::Receiver<bool>,
	deadline: Option<Instant>,
}

impl CancelToken {
	/// Creates a linked handle/token pair.
	pub fn new() -> (CancelHandle, CancelToken) {
		let (tx, rx) = watch::channel(false);
		(CancelHandle { tx }, CancelToken { rx, deadline: None })
	}

	/// A token that never fires on its own.
	pub fn never() -> Self {
		let (_, token) = Self::new();
		token
	}

	/// Returns a copy of this token that also fires at `deadline`.
	///
	/// An existing earlier deadline is kept.
	pub fn with_deadline(&self, deadline: Instant) -> Self {
		let deadline = match self.deadline {
			Some(existing) if existing <= deadline => existing,
			_ => deadline,
		};
		Self {
			rx: self.rx.clone(),
			deadline: Some(deadline),
		}
	}

	/// Returns a copy of this token that also fires after `timeout`.
	pub fn with_timeout(&self, timeout: std::time::Duration) -> Self {
		self.with_deadline(Instant::now() + timeout)
	}

	/// Checks the token without waiting.
	pub fn check(&self) -> Result<(), CancelReason> {
		if *self.rx.borrow() {
			return Err(CancelReason::Cancelled);
		}
		if let Some(deadline) = self.deadline {
			if Instant::now() >= deadline {
				return Err(CancelReason::DeadlineExceeded);
			}
		}
		Ok(())
	}

	/// Resolves once the token fires.
	pub async fn cancelled(&self) -> CancelReason {
		let mut rx = self.rx.clone();
		let signal = async move {
			loop {
				if *rx.borrow_and_update() {
					return;
				}
				if rx.changed().await.is_err() {
					// Handle dropped without firing.
					std::future::pending::<()>().await;
				}
			}
		};

		match self.deadline {
			Some(deadline) => tokio::select! {
				_ = signal => CancelReason::Cancelled,
				_ = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
			},
			None => {
				signal.await;
				CancelReason::Cancelled
			}
		}
	}

	/// Runs `fut` unless the token fires first.
	pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, CancelReason> {
		self.check()?;
		tokio::select! {
			biased;
			reason = self.cancelled() => Err(reason),
			output = fut => Ok(output),
		}
	}

	/// Runs a fallible future, folding cancellation into its error type.
	pub async fn guard<T, E, F>(&self, fut: F) -> Result<T, E>
	where
		F: Future<Output = Result<T, E>>,
		E: From<CancelReason>,
	{
		match self.run(fut).await {
			Ok(result) => result,
			Err(reason) => Err(reason.into()),
		}
	}

	/// Sleeps for `duration` unless the token fires first.
	pub async fn sleep(&self, duration: std::time::Duration) -> Result<(), CancelReason> {
		self.run(tokio::time::sleep(duration)).await
	}
}

impl Default for CancelToken {
	fn default() -> Self {
		Self::never()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn test_never_runs_to_completion() {
		let token = CancelToken::never();
		let value = token.run(async { 7 }).await.unwrap();
		assert_eq!(value, 7);
	}

	#[tokio::test]
	async fn test_cancel_before_run() {
		let (handle, token) = CancelToken::new();
		handle.cancel();
		let result = token.run(async { 1 }).await;
		assert_eq!(result, Err(CancelReason::Cancelled));
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_interrupts_sleep() {
		let (handle, token) = CancelToken::new();
		let sleeper = tokio::spawn(async move { token.sleep(Duration::from_secs(3600)).await });
		tokio::time::sleep(Duration::from_secs(1)).await;
		handle.cancel();
		assert_eq!(sleeper.await.unwrap(), Err(CancelReason::Cancelled));
	}

	#[tokio::test(start_paused = true)]
	async fn test_deadline_exceeded() {
		let token = CancelToken::never().with_timeout(Duration::from_secs(5));
		let result = token.sleep(Duration::from_secs(10)).await;
		assert_eq!(result, Err(CancelReason::DeadlineExceeded));
	}

	#[tokio::test(start_paused = true)]
	async fn test_earlier_deadline_is_kept() {
		let token = CancelToken::never().with_timeout(Duration::from_secs(5));
		let later = token.with_timeout(Duration::from_secs(60));
		let result = later.sleep(Duration::from_secs(10)).await;
		assert_eq!(result, Err(CancelReason::DeadlineExceeded));
	}
}
