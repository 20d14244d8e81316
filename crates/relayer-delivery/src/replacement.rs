//! Replacement of transactions stuck in the mempool.

use crate::{DeliveryError, DeliveryNode, TxLifecycleManager};
use alloy_primitives::TxHash;
use alloy_rpc_types::TransactionRequest;
use relayer_types::{
	CancelToken, GasFeeBounds, ReceiptSummary, TxSnapshot, ACCESS_LIST_TX_TYPE, BLOB_TX_TYPE,
	DYNAMIC_FEE_TX_TYPE, LEGACY_TX_TYPE,
};
use tokio::time::Instant;
use tracing::instrument;

/// How a replacement run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplacementOutcome {
	/// The original transaction left the mempool on its own.
	Mined,
	/// A fee-bumped replacement was submitted and confirmed.
	Replaced(ReceiptSummary),
}

fn bumped(field: &str, current: u128, increment: u128, max: u128) -> Result<u128, DeliveryError> {
	let value = current.saturating_add(increment);
	if value > max {
		return Err(DeliveryError::Configuration(format!(
			"{} {} exceeds configured maximum {}",
			field, value, max
		)));
	}
	Ok(value)
}

/// Builds the replacement request for `tx` by adding the configured increments.
///
/// Legacy and access-list transactions bump `gas_price`; dynamic-fee and blob
/// transactions bump both caps. A result above its ceiling is an error.
pub fn bump_fees(tx: &TxSnapshot, bounds: &GasFeeBounds) -> Result<TransactionRequest, DeliveryError> {
	let mut request = tx.request.clone();
	match tx.tx_type {
		LEGACY_TX_TYPE | ACCESS_LIST_TX_TYPE => {
			let current = request.gas_price.unwrap_or_default();
			request.gas_price = Some(bumped(
				"gas price",
				current,
				bounds.gas_price_inc,
				bounds.max_gas_price,
			)?);
		},
		DYNAMIC_FEE_TX_TYPE | BLOB_TX_TYPE => {
			let tip = request.max_priority_fee_per_gas.unwrap_or_default();
			let fee = request.max_fee_per_gas.unwrap_or_default();
			request.max_priority_fee_per_gas = Some(bumped(
				"gas tip cap",
				tip,
				bounds.gas_tip_cap_inc,
				bounds.max_gas_tip_cap,
			)?);
			request.max_fee_per_gas = Some(bumped(
				"gas fee cap",
				fee,
				bounds.gas_fee_cap_inc,
				bounds.max_gas_fee_cap,
			)?);
		},
		other => {
			return Err(DeliveryError::Configuration(format!(
				"cannot replace transaction of type {}",
				other
			)))
		},
	}
	Ok(request)
}

impl<N: DeliveryNode> TxLifecycleManager<N> {
	/// Watches `tx_hash` and replaces it once it has been pending too long.
	///
	/// The transaction is checked every `check_interval`. Once it has been
	/// pending for longer than the configured threshold since `pending_since`,
	/// its fees are bumped, it is re-signed with the same nonce and the
	/// replacement is followed to its receipt.
	#[instrument(skip_all, fields(tx_hash = %tx_hash))]
	pub async fn replace_stuck_transaction(
		&self,
		ctx: &CancelToken,
		tx_hash: TxHash,
		pending_since: Instant,
	) -> Result<ReplacementOutcome, DeliveryError> {
		let replace = self.config.replace.clone().ok_or_else(|| {
			DeliveryError::Configuration("tx.replace must be configured to replace transactions".into())
		})?;
		let period = replace.check_interval();
		if period.is_zero() {
			return Err(DeliveryError::Configuration("tx.replace.check_interval_secs must be positive".into()));
		}
		let threshold = replace.pending_duration_to_replace();
		let mut ticker = tokio::time::interval_at(Instant::now() + period, period);

		loop {
			ctx.run(ticker.tick()).await?;

			let tx = ctx
				.guard(self.node.transaction_by_hash(tx_hash))
				.await?
				.ok_or_else(|| DeliveryError::NotFound(format!("transaction {}", tx_hash)))?;

			if !tx.is_pending() {
				tracing::info!(block = ?tx.block_number, "Transaction no longer pending");
				return Ok(ReplacementOutcome::Mined);
			}

			let pending_for = pending_since.elapsed();
			if pending_for <= threshold {
				tracing::debug!(?pending_for, ?threshold, "Transaction still pending");
				continue;
			}

			let request = bump_fees(&tx, &replace.bounds())?;
			tracing::info!(
				nonce = ?request.nonce,
				gas_price = ?request.gas_price,
				max_fee_per_gas = ?request.max_fee_per_gas,
				max_priority_fee_per_gas = ?request.max_priority_fee_per_gas,
				"Replacing stuck transaction"
			);

			let raw = self.account.sign_transaction(request).await?;
			let receipt = self.send_and_wait(ctx, &raw).await?;
			return Ok(ReplacementOutcome::Replaced(receipt));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lifecycle::tests::manager;
	use alloy_consensus::{Transaction as _, TxEnvelope};
	use alloy_eips::eip2718::Decodable2718;
	use alloy_network::TransactionBuilder;
	use alloy_primitives::{address, b256, Address};
	use relayer_config::{ReceiptConfig, ReplaceTxConfig, TxConfig};
	use relayer_types::testing::MockNode;
	use std::sync::Arc;
	use std::time::Duration;

	const SENDER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
	const TX_HASH: TxHash =
		b256!("00000000000000000000000000000000000000000000000000000000000000bb");

	fn bounds() -> GasFeeBounds {
		GasFeeBounds {
			gas_price_inc: 1,
			max_gas_price: 20_000,
			gas_tip_cap_inc: 10,
			max_gas_tip_cap: 1_000,
			gas_fee_cap_inc: 20,
			max_gas_fee_cap: 2_000,
		}
	}

	fn replace_config(max_gas_price: u128) -> TxConfig {
		TxConfig {
			receipt: ReceiptConfig {
				attempts: 1,
				interval_secs: 1,
			},
			replace: Some(ReplaceTxConfig {
				check_interval_secs: 5,
				pending_duration_to_replace_secs: 10,
				gas_price_inc: 1,
				max_gas_price,
				gas_tip_cap_inc: 10,
				max_gas_tip_cap: 1_000,
				gas_fee_cap_inc: 20,
				max_gas_fee_cap: 2_000,
			}),
			..Default::default()
		}
	}

	fn legacy_snapshot(block_number: Option<u64>) -> TxSnapshot {
		TxSnapshot {
			hash: TX_HASH,
			tx_type: LEGACY_TX_TYPE,
			request: TransactionRequest::default()
				.with_from(SENDER)
				.with_to(address!("1234567890123456789012345678901234567890"))
				.with_nonce(4)
				.with_gas_limit(21_000)
				.with_gas_price(19_800),
			block_number,
		}
	}

	fn dynamic_snapshot(tip: u128, fee: u128) -> TxSnapshot {
		TxSnapshot {
			hash: TX_HASH,
			tx_type: DYNAMIC_FEE_TX_TYPE,
			request: TransactionRequest::default()
				.with_nonce(4)
				.with_max_priority_fee_per_gas(tip)
				.with_max_fee_per_gas(fee),
			block_number: None,
		}
	}

	#[test]
	fn test_legacy_bump_adds_increment() {
		let request = bump_fees(&legacy_snapshot(None), &bounds()).unwrap();
		assert_eq!(request.gas_price, Some(19_801));
		assert_eq!(request.nonce, Some(4));
	}

	#[test]
	fn test_bump_above_ceiling_is_rejected() {
		let tight = GasFeeBounds {
			max_gas_price: 19_800,
			..bounds()
		};
		let err = bump_fees(&legacy_snapshot(None), &tight).unwrap_err();
		assert!(matches!(err, DeliveryError::Configuration(ref msg) if msg.contains("19801")));
	}

	#[test]
	fn test_dynamic_bump_raises_both_caps() {
		let request = bump_fees(&dynamic_snapshot(100, 200), &bounds()).unwrap();
		assert_eq!(request.max_priority_fee_per_gas, Some(110));
		assert_eq!(request.max_fee_per_gas, Some(220));
		assert_eq!(request.gas_price, None);

		let err = bump_fees(&dynamic_snapshot(100, 1_990), &bounds()).unwrap_err();
		assert!(matches!(err, DeliveryError::Configuration(_)));
	}

	#[test]
	fn test_unknown_type_is_rejected() {
		let tx = TxSnapshot {
			tx_type: 0x7e,
			..legacy_snapshot(None)
		};
		assert!(matches!(
			bump_fees(&tx, &bounds()),
			Err(DeliveryError::Configuration(_))
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_stuck_transaction_is_replaced() {
		let node = Arc::new(MockNode::new());
		node.auto_mine(Some(true));
		node.push_transaction(legacy_snapshot(None));

		let start = Instant::now();
		let outcome = manager(&node, replace_config(20_000))
			.replace_stuck_transaction(&CancelToken::never(), TX_HASH, start)
			.await
			.unwrap();

		let sent = node.sent_transactions();
		assert_eq!(sent.len(), 1);
		assert!(matches!(
			outcome,
			ReplacementOutcome::Replaced(ref receipt) if receipt.tx_hash == MockNode::hash_of(&sent[0])
		));
		// Checked at 5s and 10s, replaced at 15s
		assert_eq!(start.elapsed(), Duration::from_secs(15));

		let envelope = TxEnvelope::decode_2718(&mut sent[0].as_ref()).unwrap();
		assert_eq!(envelope.nonce(), 4);
		assert_eq!(envelope.gas_price(), Some(19_801));
	}

	#[tokio::test(start_paused = true)]
	async fn test_ceiling_stops_replacement_before_sending() {
		let node = Arc::new(MockNode::new());
		node.push_transaction(legacy_snapshot(None));

		let err = manager(&node, replace_config(19_800))
			.replace_stuck_transaction(&CancelToken::never(), TX_HASH, Instant::now())
			.await
			.unwrap_err();

		assert!(matches!(err, DeliveryError::Configuration(_)));
		assert!(node.sent_transactions().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_mined_transaction_resolves() {
		let node = Arc::new(MockNode::new());
		node.push_transaction(legacy_snapshot(None));
		node.push_transaction(legacy_snapshot(Some(77)));

		let outcome = manager(&node, replace_config(20_000))
			.replace_stuck_transaction(&CancelToken::never(), TX_HASH, Instant::now())
			.await
			.unwrap();

		assert_eq!(outcome, ReplacementOutcome::Mined);
		assert!(node.sent_transactions().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_unknown_transaction_is_not_found() {
		let node = Arc::new(MockNode::new());

		let err = manager(&node, replace_config(20_000))
			.replace_stuck_transaction(&CancelToken::never(), TX_HASH, Instant::now())
			.await
			.unwrap_err();
		assert!(matches!(err, DeliveryError::NotFound(_)));
	}

	#[tokio::test(start_paused = true)]
	async fn test_replacement_requires_config() {
		let node = Arc::new(MockNode::new());
		node.push_transaction(legacy_snapshot(None));

		let err = manager(&node, TxConfig::default())
			.replace_stuck_transaction(&CancelToken::never(), TX_HASH, Instant::now())
			.await
			.unwrap_err();
		assert!(matches!(err, DeliveryError::Configuration(_)));
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancellation_ends_watch() {
		let node = Arc::new(MockNode::new());
		node.push_transaction(legacy_snapshot(None));
		let ctx = CancelToken::never().with_timeout(Duration::from_secs(7));

		let err = manager(&node, replace_config(20_000))
			.replace_stuck_transaction(&ctx, TX_HASH, Instant::now())
			.await
			.unwrap_err();
		assert!(matches!(err, DeliveryError::Cancelled(_)));
		assert!(node.sent_transactions().is_empty());
	}
}
