//! Transaction submission and receipt tracking.

use crate::{DeliveryError, DeliveryNode, FeeCalculator};
use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, TxHash};
use alloy_rpc_types::TransactionRequest;
use relayer_account::AccountInterface;
use relayer_config::TxConfig;
use relayer_revert::ErrorRepository;
use relayer_types::{with_0x_prefix, CancelToken, GasPricing, NodeError, ReceiptSummary};
use std::sync::Arc;
use tracing::instrument;

/// Submits relay transactions and follows them to inclusion.
pub struct TxLifecycleManager<N> {
	pub(crate) node: Arc<N>,
	pub(crate) account: Arc<dyn AccountInterface>,
	fees: FeeCalculator<N>,
	errors: Arc<ErrorRepository>,
	pub(crate) config: TxConfig,
}

impl<N: DeliveryNode> TxLifecycleManager<N> {
	pub fn new(
		node: Arc<N>,
		account: Arc<dyn AccountInterface>,
		errors: Arc<ErrorRepository>,
		config: TxConfig,
	) -> Self {
		let fees = FeeCalculator::new(node.clone(), account.address(), config.clone());
		Self {
			node,
			account,
			fees,
			errors,
			config,
		}
	}

	pub fn sender(&self) -> Address {
		self.account.address()
	}

	pub fn fee_calculator(&self) -> &FeeCalculator<N> {
		&self.fees
	}

	/// Broadcasts a signed transaction.
	pub async fn submit(&self, ctx: &CancelToken, raw: &[u8]) -> Result<TxHash, DeliveryError> {
		let tx_hash = ctx.guard(self.node.send_raw_transaction(raw)).await?;
		tracing::info!(%tx_hash, sender = %self.sender(), "Submitted transaction");
		Ok(tx_hash)
	}

	/// Polls for the receipt of `tx_hash`.
	///
	/// Missing receipts and transport failures are retried up to the
	/// configured attempt count with a fixed delay; once attempts run out
	/// the last error is returned. A failed receipt becomes
	/// `DeliveryError::Reverted` carrying the decoded revert reason.
	#[instrument(skip_all, fields(tx_hash = %tx_hash))]
	pub async fn wait_for_receipt(
		&self,
		ctx: &CancelToken,
		tx_hash: TxHash,
	) -> Result<ReceiptSummary, DeliveryError> {
		let attempts = self.config.receipt.attempts.max(1);
		let interval = self.config.receipt.interval();
		let mut last_error = DeliveryError::NotFound(format!("receipt for {}", tx_hash));

		for attempt in 1..=attempts {
			ctx.check()?;
			match ctx.guard(self.node.transaction_receipt(tx_hash)).await {
				Ok(Some(receipt)) => return self.check_receipt(ctx, receipt).await,
				Ok(None) => {
					last_error = DeliveryError::NotFound(format!("receipt for {}", tx_hash));
				},
				Err(NodeError::Cancelled(reason)) => return Err(reason.into()),
				Err(e) => {
					tracing::debug!(attempt, error = %e, "Receipt lookup failed");
					last_error = e.into();
				},
			}

			if attempt < attempts {
				tracing::debug!(attempt, attempts, "Receipt not available yet");
				ctx.sleep(interval).await?;
			}
		}

		Err(last_error)
	}

	async fn check_receipt(
		&self,
		ctx: &CancelToken,
		receipt: ReceiptSummary,
	) -> Result<ReceiptSummary, DeliveryError> {
		if receipt.success {
			tracing::info!(
				tx_hash = %receipt.tx_hash,
				block = receipt.block_number,
				gas_used = receipt.gas_used,
				"Transaction confirmed"
			);
			return Ok(receipt);
		}

		let reason = self.revert_reason(ctx, &receipt).await?;
		tracing::warn!(tx_hash = %receipt.tx_hash, %reason, "Transaction reverted");
		Err(DeliveryError::Reverted {
			tx_hash: receipt.tx_hash,
			reason,
		})
	}

	/// Best-effort revert reason for a failed receipt.
	///
	/// Falls back to the raw revert bytes in hex when they cannot be
	/// decoded, and to a note when the node returns none.
	pub async fn revert_reason(
		&self,
		ctx: &CancelToken,
		receipt: &ReceiptSummary,
	) -> Result<String, DeliveryError> {
		let data = match ctx
			.guard(self.node.revert_data(receipt.tx_hash, receipt.block_number))
			.await
		{
			Ok(Some(data)) => data,
			Ok(None) => return Ok("revert data unavailable".to_string()),
			Err(NodeError::Cancelled(reason)) => return Err(reason.into()),
			Err(e) => return Ok(format!("revert data unavailable: {}", e)),
		};

		Ok(match self.errors.decode(&data) {
			Ok(reason) => reason,
			Err(e) => {
				tracing::debug!(error = %e, "Could not decode revert data");
				with_0x_prefix(&hex::encode(&data))
			},
		})
	}

	/// Broadcasts `raw` and waits for its receipt.
	pub async fn send_and_wait(
		&self,
		ctx: &CancelToken,
		raw: &[u8],
	) -> Result<ReceiptSummary, DeliveryError> {
		let tx_hash = self.submit(ctx, raw).await?;
		self.wait_for_receipt(ctx, tx_hash).await
	}

	/// Fills, prices, signs and sends `request`, then waits for its receipt.
	///
	/// A missing nonce is taken from the node's pending count and a missing
	/// gas limit from the configured fallback.
	pub async fn send_transaction(
		&self,
		ctx: &CancelToken,
		request: TransactionRequest,
	) -> Result<ReceiptSummary, DeliveryError> {
		let nonce = match request.nonce {
			Some(nonce) => nonce,
			None => ctx.guard(self.node.pending_nonce(self.sender())).await?,
		};
		let gas_limit = request.gas.or(self.config.gas_limit).ok_or_else(|| {
			DeliveryError::Configuration("no gas limit on request and no tx.gas_limit configured".into())
		})?;

		let pricing = self.fees.gas_pricing(ctx, Some(nonce)).await?;
		let request = apply_pricing(request.with_nonce(nonce).with_gas_limit(gas_limit), pricing);

		let raw = self.account.sign_transaction(request).await?;
		self.send_and_wait(ctx, &raw).await
	}
}

/// Writes `pricing` into `request`, clearing the fields of the other kind.
pub(crate) fn apply_pricing(mut request: TransactionRequest, pricing: GasPricing) -> TransactionRequest {
	match pricing {
		GasPricing::Legacy { gas_price } => {
			request.gas_price = Some(gas_price);
			request.max_fee_per_gas = None;
			request.max_priority_fee_per_gas = None;
		},
		GasPricing::Dynamic {
			max_priority_fee_per_gas,
			max_fee_per_gas,
		} => {
			request.gas_price = None;
			request.max_fee_per_gas = Some(max_fee_per_gas);
			request.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
		},
	}
	request
}
