//! Gas pricing.
//!
//! Legacy transactions take the node's suggested gas price. Dynamic-fee
//! transactions derive tip and fee caps from `eth_feeHistory`. In both
//! cases a transaction replacing a pending one at the same nonce is priced
//! at least `price_bump` percent above it, and a suggestion below what is
//! already pending is treated as stale.

use crate::DeliveryError;
use alloy_primitives::Address;
use relayer_config::TxConfig;
use relayer_types::{
	bump_by_percent, CancelToken, GasPricing, PendingTxSnapshot, ReadsFeeHistory,
	ReadsPendingTransactions, SuggestsGasPrice, TxType,
};
use std::sync::Arc;
use tracing::instrument;

/// Replacement floors derived from a pending transaction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Floors {
	gas_price: u128,
	gas_tip_cap: u128,
	gas_fee_cap: u128,
}

/// Computes gas pricing for transactions sent by one account.
pub struct FeeCalculator<N> {
	node: Arc<N>,
	sender: Address,
	config: TxConfig,
}

impl<N> FeeCalculator<N>
where
	N: SuggestsGasPrice + ReadsFeeHistory + ReadsPendingTransactions,
{
	pub fn new(node: Arc<N>, sender: Address, config: TxConfig) -> Self {
		Self {
			node,
			sender,
			config,
		}
	}

	/// Prices a transaction, optionally replacing the pending one at `nonce`.
	#[instrument(skip_all, fields(tx_type = ?self.config.tx_type, nonce = ?nonce))]
	pub async fn gas_pricing(
		&self,
		ctx: &CancelToken,
		nonce: Option<u64>,
	) -> Result<GasPricing, DeliveryError> {
		let pending = self.pending_at(ctx, nonce).await?;
		let floors = self.floors(pending.as_ref());

		let pricing = match self.config.tx_type {
			TxType::Legacy => self.legacy(ctx, pending.as_ref(), floors).await?,
			TxType::Dynamic => self.dynamic(ctx, pending.as_ref(), floors).await?,
		};
		tracing::debug!(?pricing, ?floors, "Computed gas pricing");
		Ok(pricing)
	}

	/// Looks up the sender's pending transaction at `nonce`.
	///
	/// Only consulted when a price bump is configured.
	async fn pending_at(
		&self,
		ctx: &CancelToken,
		nonce: Option<u64>,
	) -> Result<Option<PendingTxSnapshot>, DeliveryError> {
		let (Some(_), Some(nonce)) = (self.config.price_bump, nonce) else {
			return Ok(None);
		};
		let pending = ctx
			.guard(self.node.pending_transactions_from(self.sender))
			.await?;
		Ok(pending.into_iter().find(|tx| tx.nonce == nonce))
	}

	fn floors(&self, pending: Option<&PendingTxSnapshot>) -> Floors {
		match (pending, self.config.price_bump) {
			(Some(tx), Some(bump)) => Floors {
				gas_price: bump_by_percent(tx.gas_price(), bump),
				gas_tip_cap: bump_by_percent(tx.gas_tip_cap(), bump),
				gas_fee_cap: bump_by_percent(tx.gas_fee_cap(), bump),
			},
			_ => Floors::default(),
		}
	}

	async fn legacy(
		&self,
		ctx: &CancelToken,
		pending: Option<&PendingTxSnapshot>,
		floors: Floors,
	) -> Result<GasPricing, DeliveryError> {
		let suggested = ctx.guard(self.node.suggest_gas_price()).await?;

		if let Some(tx) = pending {
			if tx.gas_price() > suggested {
				return Err(DeliveryError::StaleGasPrice {
					pending: tx.gas_price(),
					suggested,
				});
			}
		}

		Ok(GasPricing::Legacy {
			gas_price: suggested.max(floors.gas_price),
		})
	}

	async fn dynamic(
		&self,
		ctx: &CancelToken,
		pending: Option<&PendingTxSnapshot>,
		floors: Floors,
	) -> Result<GasPricing, DeliveryError> {
		let dynamic = &self.config.dynamic;
		let (reward, base_fee) = self.sample_fee_history(ctx).await?;

		let suggested_tip_cap = dynamic.priority_fee_rate.apply(reward);
		let suggested_fee_cap =
			suggested_tip_cap.saturating_add(dynamic.base_fee_rate.apply(base_fee));

		if let Some(tx) = pending {
			if tx.gas_tip_cap() > suggested_tip_cap && tx.gas_fee_cap() > suggested_fee_cap {
				return Err(DeliveryError::StaleDynamicFee {
					pending_tip_cap: tx.gas_tip_cap(),
					pending_fee_cap: tx.gas_fee_cap(),
					suggested_tip_cap,
					suggested_fee_cap,
				});
			}
		}

		let mut tip_cap = suggested_tip_cap.max(floors.gas_tip_cap);
		let mut fee_cap = suggested_fee_cap.max(floors.gas_fee_cap);
		if let Some(limit) = dynamic.limit_priority_fee_per_gas {
			tip_cap = tip_cap.min(limit);
		}
		if let Some(limit) = dynamic.limit_fee_per_gas {
			fee_cap = fee_cap.min(limit);
		}

		if fee_cap < tip_cap {
			return Err(DeliveryError::Configuration(format!(
				"fee cap {} is below tip cap {}",
				fee_cap, tip_cap
			)));
		}

		Ok(GasPricing::Dynamic {
			max_priority_fee_per_gas: tip_cap,
			max_fee_per_gas: fee_cap,
		})
	}

	/// Samples one block's reward and base fee, walking back from the head
	/// past blocks that report no reward.
	async fn sample_fee_history(&self, ctx: &CancelToken) -> Result<(u128, u128), DeliveryError> {
		let dynamic = &self.config.dynamic;
		let percentiles = [dynamic.fee_history_reward_percentile];
		let latest = ctx.guard(self.node.block_number()).await?;

		for offset in 0..=dynamic.max_retry_for_fee_history {
			let Some(block) = latest.checked_sub(u64::from(offset)) else {
				break;
			};
			let history = ctx
				.guard(self.node.fee_history(1, block, &percentiles))
				.await?;

			let reward = history
				.reward
				.as_ref()
				.and_then(|rewards| rewards.first())
				.and_then(|block_rewards| block_rewards.first())
				.copied()
				.unwrap_or_default();
			if reward == 0 {
				tracing::debug!(block, "Fee history reports no reward, trying an older block");
				continue;
			}

			let base_fee = history.base_fee_per_gas.first().copied().unwrap_or_default();
			return Ok((reward, base_fee));
		}

		Err(DeliveryError::FeeHistoryUnavailable {
			blocks: dynamic.max_retry_for_fee_history.saturating_add(1),
		})
	}
}
