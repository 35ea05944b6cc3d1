//! # Fee Arithmetic
//!
//! Network fee estimation and the marketplace payout formulas shared by the
//! builders and verifiers.
//!
//! Every input is counted as a 180 byte legacy input and every output as 34
//! bytes. Buyer and marketplace must compute the same number.

use crate::{error::Result, providers::FeeRateOracle, OrdexError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed transaction overhead in bytes
pub const BASE_TX_SIZE: u64 = 10;

/// Size counted for every input
pub const INPUT_SIZE: u64 = 180;

/// Size counted for every output
pub const OUTPUT_SIZE: u64 = 34;

/// Basis point denominator
pub const BASIS_POINTS: u64 = 10_000;

/// Fee priority tiers offered by the fee oracle
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FeeTier {
    /// Next block
    #[serde(rename = "fastestFee")]
    Fastest,
    /// Within about thirty minutes
    #[serde(rename = "halfHourFee")]
    HalfHour,
    /// Lowest rate still relayed
    #[serde(rename = "minimumFee")]
    Minimum,
    /// Within about an hour; unknown names deserialize here
    #[default]
    #[serde(rename = "hourFee", other)]
    Hour,
}

impl FeeTier {
    /// Parse a tier name; unknown names fall back to `Hour`
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

impl FromStr for FeeTier {
    type Err = OrdexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fastestFee" | "fastest" => Ok(Self::Fastest),
            "halfHourFee" | "halfHour" => Ok(Self::HalfHour),
            "hourFee" | "hour" => Ok(Self::Hour),
            "minimumFee" | "minimum" => Ok(Self::Minimum),
            other => Err(OrdexError::invalid(format!("Unknown fee tier: {other}"))),
        }
    }
}

impl fmt::Display for FeeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fastest => "fastestFee",
            Self::HalfHour => "halfHourFee",
            Self::Hour => "hourFee",
            Self::Minimum => "minimumFee",
        };
        f.write_str(name)
    }
}

/// Fee in satoshis for a transaction of the given shape at `fee_rate` sat/byte
pub fn calculate_tx_bytes_fee_with_rate(
    inputs: usize,
    outputs: usize,
    fee_rate: u64,
    include_change: bool,
) -> Result<u64> {
    let outputs_size = (outputs as u64)
        .checked_add(u64::from(include_change))
        .and_then(|count| count.checked_mul(OUTPUT_SIZE));
    (inputs as u64)
        .checked_mul(INPUT_SIZE)
        .zip(outputs_size)
        .and_then(|(ins, outs)| ins.checked_add(outs))
        .and_then(|size| size.checked_add(BASE_TX_SIZE))
        .and_then(|tx_size| tx_size.checked_mul(fee_rate))
        .ok_or_else(|| {
            OrdexError::invalid(format!(
                "fee overflows for {inputs} inputs, {outputs} outputs at {fee_rate} sat/vB"
            ))
        })
}

/// Value paid to the seller: price, less the maker fee, plus the value already
/// sitting in the artifact's output.
pub fn seller_ord_output_value(price: u64, maker_fee_bp: u64, prev_utxo_value: u64) -> u64 {
    price
        .saturating_sub(basis_points_of(price, maker_fee_bp))
        .saturating_add(prev_utxo_value)
}

/// Platform fee: maker plus taker basis points of the price
pub fn platform_fee_value(price: u64, maker_fee_bp: u64, taker_fee_bp: u64) -> Result<u64> {
    let bp = maker_fee_bp.checked_add(taker_fee_bp).ok_or_else(|| {
        OrdexError::invalid(format!(
            "fee basis points overflow: {maker_fee_bp} + {taker_fee_bp}"
        ))
    })?;
    Ok(basis_points_of(price, bp))
}

fn basis_points_of(amount: u64, bp: u64) -> u64 {
    let value = (amount as u128 * bp as u128) / BASIS_POINTS as u128;
    u64::try_from(value).unwrap_or(u64::MAX)
}

/// Converts fee tiers into byte fees through an injected oracle
pub struct FeeEstimator<'a> {
    oracle: &'a dyn FeeRateOracle,
}

impl<'a> FeeEstimator<'a> {
    /// Wrap a fee rate oracle
    pub fn new(oracle: &'a dyn FeeRateOracle) -> Self {
        Self { oracle }
    }

    /// Current rate for the tier; a zero rate is an error
    pub fn fee_rate(&self, tier: FeeTier) -> Result<u64> {
        let rate = self.oracle.get_fee_rate(tier)?;
        if rate == 0 {
            return Err(OrdexError::invalid(format!(
                "fee oracle returned no rate for {tier}"
            )));
        }
        Ok(rate)
    }

    /// Fee for `inputs` inputs and `outputs` outputs, plus a change output
    /// when `include_change` is set
    pub fn estimate_fee(
        &self,
        inputs: usize,
        outputs: usize,
        tier: FeeTier,
        include_change: bool,
    ) -> Result<u64> {
        let rate = self.fee_rate(tier)?;
        calculate_tx_bytes_fee_with_rate(inputs, outputs, rate, include_change)
    }
}
