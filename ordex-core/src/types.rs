//! # Marketplace Data Model
//!
//! Artifacts, spendable outputs, and the listing state that accumulates the
//! seller's and buyer's PSBTs between build, sign and merge.

use crate::{error::Result, fees::FeeTier, providers::NodeRpc, OrdexError};
use bitcoin::{OutPoint, Transaction, TxOut, Txid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position of an inscribed sat: `txid:vout:offset`
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Location {
    /// Output currently holding the artifact
    pub outpoint: OutPoint,
    /// Offset of the inscribed sat inside that output
    pub offset: u64,
}

impl FromStr for Location {
    type Err = OrdexError;

    fn from_str(s: &str) -> Result<Self> {
        let (output, offset) = s
            .rsplit_once(':')
            .ok_or_else(|| OrdexError::invalid(format!("Invalid location: {s}")))?;
        let outpoint = OutPoint::from_str(output)
            .map_err(|e| OrdexError::invalid(format!("Invalid location output {output}: {e}")))?;
        let offset = offset
            .parse::<u64>()
            .map_err(|_| OrdexError::invalid(format!("Invalid location offset: {offset}")))?;
        Ok(Self { outpoint, offset })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.outpoint, self.offset)
    }
}

impl TryFrom<String> for Location {
    type Error = OrdexError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.to_string()
    }
}

/// An inscription as reported by the artifact index.
///
/// The genesis fields never change. `location` and the listing fields move
/// with every transfer and every (de)listing; a PSBT built against an old
/// location is stale.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// Inscription id (`<genesis txid>i<index>`)
    pub id: String,

    /// Inscription number
    pub inscription_number: i64,

    /// Transaction that created the inscription
    pub genesis_transaction: Txid,

    /// Address currently owning the holding output
    pub owner: String,

    /// Current location of the inscribed sat
    pub location: Location,

    /// Value of the holding output in satoshis
    pub output_value: u64,

    /// MIME type of the content
    #[serde(default)]
    pub content_type: Option<String>,

    /// Whether the artifact currently has an active listing
    #[serde(default)]
    pub listed: bool,

    /// When the active listing was created
    #[serde(default)]
    pub listed_at: Option<DateTime<Utc>>,

    /// Listing price in satoshis
    #[serde(default)]
    pub listed_price: Option<u64>,

    /// Maker fee recorded with the listing
    #[serde(default)]
    pub listed_maker_fee_bp: Option<u64>,

    /// Address the seller is paid to
    #[serde(default)]
    pub listed_seller_receive_address: Option<String>,
}

impl Artifact {
    /// Output currently holding the artifact
    pub fn output(&self) -> OutPoint {
        self.location.outpoint
    }

    /// Offset of the inscribed sat inside the holding output
    pub fn offset(&self) -> u64 {
        self.location.offset
    }
}

/// Confirmation status of a UTXO
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UtxoStatus {
    /// Included in a block
    pub confirmed: bool,
    /// Height of the including block
    #[serde(default)]
    pub block_height: Option<u32>,
    /// Timestamp of the including block
    #[serde(default)]
    pub block_time: Option<u64>,
}

impl UtxoStatus {
    /// Status of a UTXO confirmed at `height`
    pub fn confirmed_at(height: u32) -> Self {
        Self {
            confirmed: true,
            block_height: Some(height),
            block_time: None,
        }
    }

    /// Status of a mempool UTXO
    pub fn unconfirmed() -> Self {
        Self::default()
    }
}

/// A spendable output together with the transaction that created it
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Utxo {
    /// Creating transaction id
    pub txid: Txid,
    /// Output index
    pub vout: u32,
    /// Value in satoshis
    pub value: u64,
    /// Confirmation status
    pub status: UtxoStatus,
    /// Full creating transaction
    pub tx: Transaction,
}

impl Utxo {
    /// Fetch the creating transaction for a bare UTXO entry
    pub fn resolve(
        node: &dyn NodeRpc,
        txid: Txid,
        vout: u32,
        value: u64,
        status: UtxoStatus,
    ) -> Result<Self> {
        let tx = node.get_raw_transaction(&txid)?;
        if tx.compute_txid() != txid {
            return Err(OrdexError::invalid(format!(
                "node returned a different transaction for {txid}"
            )));
        }
        if tx.output.get(vout as usize).is_none() {
            return Err(OrdexError::invalid(format!(
                "transaction {txid} has no output {vout}"
            )));
        }
        Ok(Self {
            txid,
            vout,
            value,
            status,
            tx,
        })
    }

    /// Outpoint of this UTXO
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }

    /// The output being spent
    pub fn tx_out(&self) -> Option<&TxOut> {
        self.tx.output.get(self.vout as usize)
    }
}

/// Seller half of a listing
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SellerState {
    /// Maker fee in basis points
    pub maker_fee_bp: u64,
    /// Address currently holding the artifact
    pub seller_ord_address: String,
    /// Asking price in satoshis
    pub price: u64,
    /// Artifact being listed
    pub artifact: Artifact,
    /// Address the seller is paid to
    pub seller_receive_address: String,
    /// Hex x-only (or compressed) internal key when the seller spends via taproot
    #[serde(default)]
    pub tap_internal_key: Option<String>,
    /// Listing PSBT awaiting the seller's signature
    #[serde(default)]
    pub unsigned_listing_psbt_base64: Option<String>,
    /// Listing PSBT signed by the seller
    #[serde(default)]
    pub signed_listing_psbt_base64: Option<String>,
}

/// Buyer half of a listing, attached once a purchase begins
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BuyerState {
    /// Taker fee in basis points
    pub taker_fee_bp: u64,
    /// Address funding the purchase and receiving dummies and change
    pub buyer_address: String,
    /// Address receiving the artifact
    pub buyer_token_receive_address: String,
    /// Fee priority
    pub fee_rate_tier: FeeTier,
    /// Hex compressed public key, required for script-hash-wrapped addresses
    #[serde(default)]
    pub buyer_public_key: Option<String>,
    /// Dummy UTXOs chosen for the purchase
    #[serde(default)]
    pub buyer_dummy_utxos: Vec<Utxo>,
    /// Payment UTXOs chosen for the purchase
    #[serde(default)]
    pub buyer_payment_utxos: Vec<Utxo>,
    /// Buying PSBT awaiting the buyer's signatures
    #[serde(default)]
    pub unsigned_buying_psbt_base64: Option<String>,
    /// Number of inputs in the unsigned buying PSBT
    #[serde(default)]
    pub unsigned_buying_psbt_input_size: Option<usize>,
    /// Buying PSBT signed by the buyer
    #[serde(default)]
    pub signed_buying_psbt_base64: Option<String>,
    /// Final transaction combining both signatures
    #[serde(default)]
    pub merged_signed_buying_psbt_base64: Option<String>,
}

impl BuyerState {
    /// Buyer state with no UTXOs chosen yet
    pub fn new(
        taker_fee_bp: u64,
        buyer_address: String,
        buyer_token_receive_address: String,
        fee_rate_tier: FeeTier,
    ) -> Self {
        Self {
            taker_fee_bp,
            buyer_address,
            buyer_token_receive_address,
            fee_rate_tier,
            buyer_public_key: None,
            buyer_dummy_utxos: Vec::new(),
            buyer_payment_utxos: Vec::new(),
            unsigned_buying_psbt_base64: None,
            unsigned_buying_psbt_input_size: None,
            signed_buying_psbt_base64: None,
            merged_signed_buying_psbt_base64: None,
        }
    }
}

/// State of one listing from seller build through merge
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ListingState {
    /// Seller half
    pub seller: SellerState,
    /// Buyer half, present once a purchase begins
    #[serde(default)]
    pub buyer: Option<BuyerState>,
}

impl ListingState {
    /// Create a listing with no artifacts built yet
    pub fn new(
        artifact: Artifact,
        price: u64,
        maker_fee_bp: u64,
        seller_receive_address: String,
    ) -> Self {
        Self {
            seller: SellerState {
                maker_fee_bp,
                seller_ord_address: artifact.owner.clone(),
                price,
                artifact,
                seller_receive_address,
                tap_internal_key: None,
                unsigned_listing_psbt_base64: None,
                signed_listing_psbt_base64: None,
            },
            buyer: None,
        }
    }

    /// Attach the buyer half when a purchase begins
    pub fn with_buyer(mut self, buyer: BuyerState) -> Self {
        self.buyer = Some(buyer);
        self
    }

    /// Buyer half or an error naming the missing step
    pub fn buyer(&self) -> Result<&BuyerState> {
        self.buyer
            .as_ref()
            .ok_or_else(|| OrdexError::invalid("Buyer address is not set"))
    }
}

/// A signed listing submitted by a seller
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ListingRequest {
    /// Asking price in satoshis
    pub price: u64,
    /// Inscription id being listed
    pub token_id: String,
    /// Address the seller is paid to
    pub seller_receive_address: String,
    /// Listing PSBT signed by the seller
    pub signed_listing_psbt_base64: String,
    /// Taproot internal key used by the seller, if any
    #[serde(default)]
    pub tap_internal_key: Option<String>,
}

/// A signed buying PSBT submitted by a buyer
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BuyingRequest {
    /// Price the buyer agreed to pay
    pub price: u64,
    /// Inscription id being bought
    pub token_id: String,
    /// Address funding the purchase
    pub buyer_address: String,
    /// Address receiving the artifact
    pub buyer_token_receive_address: String,
    /// Buying PSBT signed by the buyer
    pub signed_buying_psbt_base64: String,
}

/// Result of a successful buying verification
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuyingVerification {
    /// Offset of the artifact inside its new output
    pub new_output_offset: u64,
}
