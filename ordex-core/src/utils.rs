//! # Utility Functions
//!
//! PSBT codecs, address and key parsing, and amount conversion.

use crate::{error::Result, OrdexError};
use bitcoin::base64::{engine::general_purpose::STANDARD, Engine};
use bitcoin::{
    address::AddressType, consensus::encode, psbt::Psbt, Address, CompressedPublicKey, Network,
    ScriptBuf, Transaction,
};
use secp256k1::XOnlyPublicKey;
use std::str::FromStr;

/// Export a PSBT as base64
pub fn psbt_to_base64(psbt: &Psbt) -> String {
    STANDARD.encode(psbt.serialize())
}

/// Import a PSBT from base64
pub fn psbt_from_base64(s: &str) -> Result<Psbt> {
    let bytes = STANDARD.decode(s.trim())?;
    Ok(Psbt::deserialize(&bytes)?)
}

/// Export a transaction as consensus hex
pub fn tx_to_hex(tx: &Transaction) -> String {
    encode::serialize_hex(tx)
}

/// Parse an address and require it to belong to `network`
pub fn parse_address(address: &str, network: Network) -> Result<Address> {
    Address::from_str(address)?
        .require_network(network)
        .map_err(|_| OrdexError::invalid(format!("Address {address} is not valid for {network}")))
}

/// Validate a Bitcoin address for the specified network
pub fn validate_address(address: &str, network: Network) -> bool {
    parse_address(address, network).is_ok()
}

/// Whether the address is a pay-to-script-hash address on `network`
pub fn is_p2sh_address(address: &str, network: Network) -> bool {
    parse_address(address, network)
        .map(|addr| addr.address_type() == Some(AddressType::P2sh))
        .unwrap_or(false)
}

/// Parse a hex taproot internal key. A 33-byte compressed key is reduced to
/// its x coordinate.
pub fn parse_x_only_key(key_hex: &str) -> Result<XOnlyPublicKey> {
    let bytes = hex::decode(key_hex)?;
    let x_only = match bytes.len() {
        32 => &bytes[..],
        33 => &bytes[1..33],
        len => {
            return Err(OrdexError::invalid(format!(
                "taproot internal key must be 32 or 33 bytes, got {len}"
            )))
        }
    };
    Ok(XOnlyPublicKey::from_slice(x_only)?)
}

/// Redeem script and locking script of a P2SH-wrapped P2WPKH spend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NestedSegwit {
    /// P2WPKH program revealed in the script sig
    pub redeem_script: ScriptBuf,
    /// P2SH locking script of the spent outputs
    pub script_pubkey: ScriptBuf,
}

impl NestedSegwit {
    /// Derive both scripts from a hex compressed public key
    pub fn from_public_key(public_key_hex: &str, network: Network) -> Result<Self> {
        let bytes = hex::decode(public_key_hex)?;
        let public_key = CompressedPublicKey::from_slice(&bytes)?;
        let redeem_script = ScriptBuf::new_p2wpkh(&public_key.wpubkey_hash());
        let script_pubkey = Address::p2shwpkh(&public_key, network).script_pubkey();
        Ok(Self {
            redeem_script,
            script_pubkey,
        })
    }

    /// Scripts for `address` when it is script-hash-wrapped, `None` otherwise
    pub fn for_address(
        address: &str,
        public_key_hex: Option<&str>,
        network: Network,
    ) -> Result<Option<Self>> {
        if !is_p2sh_address(address, network) {
            return Ok(None);
        }
        let public_key_hex = public_key_hex.ok_or_else(|| {
            OrdexError::invalid(format!(
                "public key required to spend from script hash address {address}"
            ))
        })?;
        let nested = Self::from_public_key(public_key_hex, network)?;
        if nested.script_pubkey != parse_address(address, network)?.script_pubkey() {
            return Err(OrdexError::invalid(format!(
                "public key does not match address {address}"
            )));
        }
        Ok(Some(nested))
    }
}

/// Convert satoshis to Bitcoin
pub fn satoshi_to_btc(satoshi: u64) -> f64 {
    satoshi as f64 / 100_000_000.0
}

/// Convert Bitcoin to satoshis
pub fn btc_to_satoshi(btc: f64) -> u64 {
    (btc * 100_000_000.0).round() as u64
}
