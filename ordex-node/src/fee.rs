//! Fee rates from `estimatesmartfee`.

use anyhow::{anyhow, Result};
use bitcoin::Amount;
use bitcoincore_rpc::{Client, RpcApi};
use log::{debug, warn};
use ordex_core::{FeeRateOracle, FeeTier};

/// Confirmation target in blocks for a tier
pub fn confirmation_target(tier: FeeTier) -> u16 {
	match tier {
		FeeTier::Fastest => 1,
		FeeTier::HalfHour => 3,
		FeeTier::Hour => 6,
		FeeTier::Minimum => 144,
	}
}

/// Convert a BTC/kvB estimate to whole sat/vB, rounding up, never below 1
pub fn sat_per_vbyte(per_kvb: Amount) -> u64 {
	per_kvb.to_sat().div_ceil(1000).max(1)
}

/// Fee oracle over a node's smart fee estimator
pub struct CoreFeeOracle<'a> {
	client: &'a Client,
	fallback: Option<u64>,
}

impl<'a> CoreFeeOracle<'a> {
	pub fn new(client: &'a Client) -> Self {
		Self {
			client,
			fallback: None,
		}
	}

	/// Rate used when the node has no estimate yet, as on a fresh regtest chain
	pub fn with_fallback(mut self, sat_per_vbyte: u64) -> Self {
		self.fallback = Some(sat_per_vbyte);
		self
	}
}

impl FeeRateOracle for CoreFeeOracle<'_> {
	fn get_fee_rate(&self, tier: FeeTier) -> Result<u64> {
		let target = confirmation_target(tier);
		let estimate = self.client.estimate_smart_fee(target, None)?;
		match (estimate.fee_rate, self.fallback) {
			(Some(per_kvb), _) => {
				let rate = sat_per_vbyte(per_kvb);
				debug!("{tier}: {rate} sat/vB for {target} blocks");
				Ok(rate)
			}
			(None, Some(fallback)) => {
				warn!("no fee estimate for {tier}, using {fallback} sat/vB");
				Ok(fallback)
			}
			(None, None) => Err(anyhow!(
				"no fee estimate for {tier}: {}",
				estimate.errors.unwrap_or_default().join(", ")
			)),
		}
	}
}
