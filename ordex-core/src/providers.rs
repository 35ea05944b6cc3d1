//! # Collaborator Contracts
//!
//! The core never talks to a node, an index or a fee service directly. Every
//! external lookup goes through one of these traits so the same builders run
//! against Bitcoin Core, an HTTP index, or in-memory fixtures.

use crate::fees::FeeTier;
use crate::types::Artifact;
use bitcoin::{OutPoint, Transaction, Txid};
use serde::{Deserialize, Serialize};

/// Recommended fee rates by priority tier
pub trait FeeRateOracle {
    /// Fee rate in sat/vB for the tier
    fn get_fee_rate(&self, tier: FeeTier) -> anyhow::Result<u64>;
}

/// Ancestry summary of a transaction as reported by a node
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxAncestry {
    /// Outputs spent by the transaction
    pub inputs: Vec<OutPoint>,
    /// Confirmations of the transaction, zero while in the mempool
    pub confirmations: u32,
}

/// Per-input result of a PSBT analysis
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputAnalysis {
    /// The input carries a complete, valid final script
    pub is_final: bool,
    /// The input carries the UTXO it spends
    pub has_utxo: bool,
}

/// Full node access
pub trait NodeRpc {
    /// Raw transaction by id
    fn get_raw_transaction(&self, txid: &Txid) -> anyhow::Result<Transaction>;

    /// Spent outputs and confirmation count of a transaction
    fn get_raw_transaction_verbose(&self, txid: &Txid) -> anyhow::Result<TxAncestry>;

    /// Signature and UTXO status of every input of a base64 PSBT
    fn analyze_psbt(&self, psbt_base64: &str) -> anyhow::Result<Vec<InputAnalysis>>;
}

/// Inscription index lookups
pub trait ArtifactIndex {
    /// Artifact currently held by the output, if any
    fn get_artifact_by_output(&self, output: &OutPoint) -> anyhow::Result<Option<Artifact>>;

    /// Artifact by inscription id
    fn get_artifact_by_id(&self, id: &str) -> anyhow::Result<Option<Artifact>>;
}

/// Maker and taker fee schedule in basis points
pub trait FeeScheduleProvider {
    /// Fee charged to the seller, deducted from the seller payout
    fn get_maker_fee_bp(&self, seller_address: &str) -> anyhow::Result<u64>;

    /// Fee charged to the buyer on top of the price
    fn get_taker_fee_bp(&self, buyer_address: &str) -> anyhow::Result<u64>;
}
