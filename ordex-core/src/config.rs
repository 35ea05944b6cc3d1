//! # Market Configuration
//!
//! Protocol values that the listing builder, buying builder and verifiers must
//! agree on exactly, with environment overrides for deployments.

use crate::{error::Result, OrdexError};
use bitcoin::{Address, Network};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default value of a freshly created dummy UTXO
pub const DEFAULT_DUMMY_UTXO_VALUE: u64 = 600;

/// Smallest value accepted as a dummy UTXO; also the dust threshold for
/// platform fee and change outputs
pub const DEFAULT_DUMMY_UTXO_MIN_VALUE: u64 = 580;

/// Largest value accepted as a dummy UTXO
pub const DEFAULT_DUMMY_UTXO_MAX_VALUE: u64 = 1000;

/// Value of the output carrying the purchased inscription to the buyer
pub const DEFAULT_ORDINALS_POSTAGE_VALUE: u64 = 10_000;

/// Market-wide settings shared by every build and verify call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MarketConfig {
    /// Network addresses are validated against
    pub network: Network,

    /// Address collecting maker and taker fees
    pub platform_fee_address: Option<String>,

    /// Value of newly created dummy outputs
    pub dummy_utxo_value: u64,

    /// Lower bound of the dummy band and dust threshold
    pub dummy_utxo_min_value: u64,

    /// Upper bound of the dummy band
    pub dummy_utxo_max_value: u64,

    /// Postage paid to the buyer's token receive address
    pub ordinals_postage_value: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            network: Network::Bitcoin,
            platform_fee_address: None,
            dummy_utxo_value: DEFAULT_DUMMY_UTXO_VALUE,
            dummy_utxo_min_value: DEFAULT_DUMMY_UTXO_MIN_VALUE,
            dummy_utxo_max_value: DEFAULT_DUMMY_UTXO_MAX_VALUE,
            ordinals_postage_value: DEFAULT_ORDINALS_POSTAGE_VALUE,
        }
    }
}

impl MarketConfig {
    /// Default configuration for the given network
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    /// Load the configuration from the process environment.
    ///
    /// Unset variables keep their defaults; set but unparsable variables are
    /// rejected.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(network) = lookup("BTC_NETWORK") {
            config.network = parse_network(&network)?;
        }
        config.platform_fee_address = lookup("PLATFORM_FEE_ADDRESS").filter(|a| !a.is_empty());

        let read_sats = |key: &str, default: u64| -> Result<u64> {
            match lookup(key) {
                Some(value) => value.trim().parse::<u64>().map_err(|_| {
                    OrdexError::invalid(format!("{key} must be an amount in sats, got {value}"))
                }),
                None => Ok(default),
            }
        };
        config.dummy_utxo_value = read_sats("DUMMY_UTXO_VALUE", config.dummy_utxo_value)?;
        config.dummy_utxo_min_value =
            read_sats("DUMMY_UTXO_MIN_VALUE", config.dummy_utxo_min_value)?;
        config.dummy_utxo_max_value =
            read_sats("DUMMY_UTXO_MAX_VALUE", config.dummy_utxo_max_value)?;
        config.ordinals_postage_value =
            read_sats("ORDINALS_POSTAGE_VALUE", config.ordinals_postage_value)?;

        config.validate()?;
        Ok(config)
    }

    /// Check the dummy band and the platform fee address
    pub fn validate(&self) -> Result<()> {
        if self.dummy_utxo_min_value > self.dummy_utxo_max_value {
            return Err(OrdexError::invalid(format!(
                "dummy band is empty: min {} > max {}",
                self.dummy_utxo_min_value, self.dummy_utxo_max_value
            )));
        }
        if self.dummy_utxo_value < self.dummy_utxo_min_value
            || self.dummy_utxo_value > self.dummy_utxo_max_value
        {
            return Err(OrdexError::invalid(format!(
                "dummy value {} outside [{}, {}]",
                self.dummy_utxo_value, self.dummy_utxo_min_value, self.dummy_utxo_max_value
            )));
        }
        if let Some(address) = &self.platform_fee_address {
            Address::from_str(address)?
                .require_network(self.network)
                .map_err(|_| {
                    OrdexError::invalid(format!(
                        "platform fee address {address} is not valid for {}",
                        self.network
                    ))
                })?;
        }
        Ok(())
    }

    /// Whether a UTXO value lies inside the dummy band
    pub fn is_dummy_value(&self, value: u64) -> bool {
        value >= self.dummy_utxo_min_value && value <= self.dummy_utxo_max_value
    }

    /// Whether an output of this value is above the dust threshold
    pub fn is_above_dust(&self, value: u64) -> bool {
        value > self.dummy_utxo_min_value
    }
}

/// Parse a network name as used by `BTC_NETWORK`
pub fn parse_network(name: &str) -> Result<Network> {
    match name.trim().to_ascii_lowercase().as_str() {
        "mainnet" | "bitcoin" | "main" => Ok(Network::Bitcoin),
        "testnet" | "test" => Ok(Network::Testnet),
        "signet" => Ok(Network::Signet),
        "regtest" => Ok(Network::Regtest),
        other => Err(OrdexError::invalid(format!("Unknown network: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = MarketConfig::default();
        assert_eq!(config.dummy_utxo_value, 600);
        assert_eq!(config.dummy_utxo_min_value, 580);
        assert_eq!(config.dummy_utxo_max_value, 1000);
        assert_eq!(config.ordinals_postage_value, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = MarketConfig::from_lookup(lookup_from(&[
            ("BTC_NETWORK", "regtest"),
            ("DUMMY_UTXO_VALUE", "700"),
            ("ORDINALS_POSTAGE_VALUE", "546"),
            ("PLATFORM_FEE_ADDRESS", ""),
        ]))
        .unwrap();
        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.dummy_utxo_value, 700);
        assert_eq!(config.ordinals_postage_value, 546);
        assert_eq!(config.platform_fee_address, None);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let result = MarketConfig::from_lookup(lookup_from(&[("DUMMY_UTXO_MIN_VALUE", "lots")]));
        assert!(matches!(result, Err(OrdexError::InvalidArgument(_))));

        let result = MarketConfig::from_lookup(lookup_from(&[("BTC_NETWORK", "moonnet")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_dummy_band() {
        let config = MarketConfig {
            dummy_utxo_value: 2000,
            ..MarketConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MarketConfig::default();
        assert!(config.is_dummy_value(580));
        assert!(config.is_dummy_value(1000));
        assert!(!config.is_dummy_value(1001));
        assert!(!config.is_above_dust(580));
        assert!(config.is_above_dust(581));
    }

    #[test]
    fn test_validate_platform_address_network() {
        let config = MarketConfig {
            platform_fee_address: Some(crate::test_utils::create_valid_address_for_network(
                7,
                Network::Bitcoin,
            )),
            ..MarketConfig::for_network(Network::Regtest)
        };
        assert!(config.validate().is_err());
    }
}
