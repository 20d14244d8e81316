//! Gas pricing types for transaction submission and replacement.
//!
//! Fee values are carried as `u128` wei, matching the width the node RPC
//! uses for gas prices. Intermediate arithmetic is done in `U256` so
//! percentage and ratio computations cannot overflow.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// EIP-2718 type byte of a legacy transaction.
pub const LEGACY_TX_TYPE: u8 = 0;
/// EIP-2718 type byte of an EIP-2930 access-list transaction.
pub const ACCESS_LIST_TX_TYPE: u8 = 1;
/// EIP-2718 type byte of an EIP-1559 dynamic-fee transaction.
pub const DYNAMIC_FEE_TX_TYPE: u8 = 2;
/// EIP-2718 type byte of an EIP-4844 blob transaction.
pub const BLOB_TX_TYPE: u8 = 3;

/// Pricing scheme used for new transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
	/// A single `gasPrice` field.
	Legacy,
	/// `maxPriorityFeePerGas` and `maxFeePerGas`.
	#[default]
	Dynamic,
}

/// A rational multiplier applied to sampled fee values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fraction {
	pub numerator: u64,
	pub denominator: u64,
}

impl Fraction {
	pub const ONE: Fraction = Fraction {
		numerator: 1,
		denominator: 1,
	};

	pub fn new(numerator: u64, denominator: u64) -> Self {
		Self {
			numerator,
			denominator,
		}
	}

	/// Multiplies `value` by this fraction using integer floor division.
	///
	/// A zero denominator yields zero; configuration validation rejects it
	/// before a fraction ever reaches this point.
	pub fn apply(&self, value: u128) -> u128 {
		if self.denominator == 0 {
			return 0;
		}
		let product = U256::from(value) * U256::from(self.numerator) / U256::from(self.denominator);
		product.saturating_to::<u128>()
	}
}

impl Default for Fraction {
	fn default() -> Self {
		Self::ONE
	}
}

/// Returns `floor(value * (100 + percent) / 100)`.
///
/// This is the minimum fee a replacement must carry for the mempool to
/// accept it over a pending transaction priced at `value`.
pub fn bump_by_percent(value: u128, percent: u64) -> u128 {
	let bumped = U256::from(value) * (U256::from(100u64) + U256::from(percent)) / U256::from(100u64);
	bumped.saturating_to::<u128>()
}

/// Fee fields of a transaction sitting in the node's mempool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingFees {
	/// Legacy or access-list transaction.
	GasPrice(u128),
	/// Dynamic-fee or blob transaction.
	Dynamic {
		gas_tip_cap: u128,
		gas_fee_cap: u128,
	},
}

/// The sender's pending transaction at a given nonce.
///
/// Fetched from the node's mempool introspection endpoint for a single fee
/// computation and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTxSnapshot {
	pub nonce: u64,
	pub fees: PendingFees,
	pub tx_type: u8,
}

impl PendingTxSnapshot {
	/// The price a legacy replacement competes against.
	///
	/// Dynamic-fee transactions compete with their fee cap.
	pub fn gas_price(&self) -> u128 {
		match self.fees {
			PendingFees::GasPrice(price) => price,
			PendingFees::Dynamic { gas_fee_cap, .. } => gas_fee_cap,
		}
	}

	/// The tip cap a dynamic replacement competes against.
	///
	/// Legacy transactions pay their whole gas price as tip.
	pub fn gas_tip_cap(&self) -> u128 {
		match self.fees {
			PendingFees::GasPrice(price) => price,
			PendingFees::Dynamic { gas_tip_cap, .. } => gas_tip_cap,
		}
	}

	/// The fee cap a dynamic replacement competes against.
	pub fn gas_fee_cap(&self) -> u128 {
		self.gas_price()
	}
}

/// Increments and ceilings applied when replacing a stuck transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasFeeBounds {
	pub gas_price_inc: u128,
	pub max_gas_price: u128,
	pub gas_tip_cap_inc: u128,
	pub max_gas_tip_cap: u128,
	pub gas_fee_cap_inc: u128,
	pub max_gas_fee_cap: u128,
}

/// Gas pricing chosen for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GasPricing {
	Legacy {
		gas_price: u128,
	},
	Dynamic {
		max_priority_fee_per_gas: u128,
		max_fee_per_gas: u128,
	},
}

impl GasPricing {
	/// Returns the per-gas amount the sender commits to at most.
	pub fn max_price(&self) -> u128 {
		match self {
			GasPricing::Legacy { gas_price } => *gas_price,
			GasPricing::Dynamic {
				max_fee_per_gas, ..
			} => *max_fee_per_gas,
		}
	}
}
