//! # Ordex Core
//!
//! PSBT construction and verification for a non-custodial ordinals
//! marketplace.
//!
//! A sale is assembled from two independently signed halves:
//! - The **seller** signs a one-input, one-output listing PSBT with
//!   `SIGHASH_SINGLE | ANYONECANPAY`, committing only to the artifact's
//!   output and to their own payout.
//! - The **buyer** signs a buying PSBT that places two dummy inputs ahead of
//!   the seller's input, so ordinal tracking delivers the inscribed sat to the
//!   buyer's receive output.
//! - The marketplace **merges** the seller's signed input into the buying
//!   PSBT, producing a transaction ready for broadcast.
//!
//! Node, inscription index, fee oracle and fee schedule access go through the
//! traits in [`providers`].
//!
//! ## Examples
//!
//! ```rust
//! use ordex_core::{platform_fee_value, seller_ord_output_value};
//!
//! // 100_000 sat price, 1% maker fee, artifact sitting in a 10_000 sat output
//! assert_eq!(seller_ord_output_value(100_000, 100, 10_000), 109_000);
//!
//! // 1% maker plus 1.5% taker
//! assert_eq!(platform_fee_value(100_000, 100, 150).unwrap(), 2_500);
//! ```

pub mod buyer;
pub mod config;
pub mod dummy;
pub mod error;
pub mod fees;
pub mod layout;
pub mod merge;
pub mod providers;
pub mod seller;
pub mod types;
pub mod utils;
pub mod utxo;

#[cfg(test)]
pub(crate) mod test_utils;

pub use buyer::BuyerSigner;
pub use config::MarketConfig;
pub use error::{OrdexError, Result};
pub use fees::{
    calculate_tx_bytes_fee_with_rate, platform_fee_value, seller_ord_output_value, FeeEstimator,
    FeeTier,
};
pub use layout::TxLayout;
pub use merge::{
    extract_merged_transaction, merge_listing, merge_signed_buying_psbt,
    merge_signed_buying_psbt_base64,
};
pub use providers::{ArtifactIndex, FeeRateOracle, FeeScheduleProvider, NodeRpc};
pub use seller::SellerSigner;
pub use types::*;
pub use utils::*;
pub use utxo::{InscriptionSafety, UtxoSelector};

/// Listing price reserved for delisting requests (20M BTC in sats, above any
/// real supply)
pub const DELIST_MAGIC_PRICE: u64 = 20_000_000 * 100_000_000;
