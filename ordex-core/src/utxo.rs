//! # UTXO Selection
//!
//! Chooses the buyer's dummy and payment UTXOs while refusing to spend any
//! output that carries, or may carry, an inscription.

use crate::{
    config::MarketConfig,
    error::Result,
    fees::{FeeEstimator, FeeTier},
    providers::{ArtifactIndex, NodeRpc},
    types::Utxo,
    OrdexError,
};
use bitcoin::OutPoint;
use log::{debug, warn};

/// Outcome of the inscription-safety check for one UTXO
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InscriptionSafety {
    /// No inscription on the output or its unconfirmed ancestry
    Safe,
    /// The output, or an unconfirmed parent output, holds an inscription
    Unsafe,
    /// The check could not complete; treated as unsafe
    Unknown,
}

impl InscriptionSafety {
    /// Only `Safe` outputs may be spent as plain bitcoin
    pub fn is_spendable(self) -> bool {
        self == Self::Safe
    }
}

/// Screens candidate UTXOs and picks dummy and payment sets
pub struct UtxoSelector<'a> {
    config: &'a MarketConfig,
    node: &'a dyn NodeRpc,
    artifacts: &'a dyn ArtifactIndex,
    fees: FeeEstimator<'a>,
}

impl<'a> UtxoSelector<'a> {
    /// Create a selector over the given collaborators
    pub fn new(
        config: &'a MarketConfig,
        node: &'a dyn NodeRpc,
        artifacts: &'a dyn ArtifactIndex,
        fees: FeeEstimator<'a>,
    ) -> Self {
        Self {
            config,
            node,
            artifacts,
            fees,
        }
    }

    /// Classify a UTXO.
    ///
    /// A confirmed output is checked directly against the index. For an
    /// unconfirmed output the parents are checked instead: an unconfirmed
    /// parent makes the ancestry unverifiable, and any parent output holding
    /// an inscription may have moved it here.
    pub fn inscription_safety(&self, utxo: &Utxo) -> InscriptionSafety {
        if utxo.status.confirmed {
            return self.output_safety(&utxo.outpoint());
        }

        let ancestry = match self.node.get_raw_transaction_verbose(&utxo.txid) {
            Ok(ancestry) => ancestry,
            Err(e) => {
                warn!("treating {} as inscribed, ancestry lookup failed: {e}", utxo.outpoint());
                return InscriptionSafety::Unknown;
            }
        };

        for parent in &ancestry.inputs {
            match self.node.get_raw_transaction_verbose(&parent.txid) {
                Ok(parent_tx) if parent_tx.confirmations == 0 => {
                    debug!("{} descends from unconfirmed {}", utxo.outpoint(), parent.txid);
                    return InscriptionSafety::Unknown;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("treating {} as inscribed, parent lookup failed: {e}", utxo.outpoint());
                    return InscriptionSafety::Unknown;
                }
            }
            match self.output_safety(parent) {
                InscriptionSafety::Safe => {}
                other => return other,
            }
        }

        InscriptionSafety::Safe
    }

    fn output_safety(&self, output: &OutPoint) -> InscriptionSafety {
        match self.artifacts.get_artifact_by_output(output) {
            Ok(None) => InscriptionSafety::Safe,
            Ok(Some(artifact)) => {
                debug!("{output} holds inscription {}", artifact.id);
                InscriptionSafety::Unsafe
            }
            Err(e) => {
                warn!("treating {output} as inscribed, index lookup failed: {e}");
                InscriptionSafety::Unknown
            }
        }
    }

    /// The first two safe candidates whose value lies in the dummy band, in
    /// candidate order. `None` when fewer than two qualify.
    pub fn select_dummy_utxos(&self, candidates: &[Utxo]) -> Option<[Utxo; 2]> {
        let mut selected: Vec<Utxo> = Vec::with_capacity(2);
        for utxo in candidates {
            if !self.config.is_dummy_value(utxo.value) {
                continue;
            }
            if !self.inscription_safety(utxo).is_spendable() {
                continue;
            }
            selected.push(utxo.clone());
            if selected.len() == 2 {
                break;
            }
        }

        let [first, second]: [Utxo; 2] = selected.try_into().ok()?;
        debug!("selected dummies {} and {}", first.outpoint(), second.outpoint());
        Some([first, second])
    }

    /// Largest-first selection of safe payment UTXOs covering `amount` plus the
    /// fee of a transaction with the existing inputs and outputs and the
    /// selected payments.
    ///
    /// Candidates at or below the default dummy value are never used as
    /// payment.
    pub fn select_payment_utxos(
        &self,
        candidates: &[Utxo],
        amount: u64,
        existing_inputs: usize,
        existing_outputs: usize,
        tier: FeeTier,
    ) -> Result<Vec<Utxo>> {
        let mut sorted: Vec<&Utxo> = candidates
            .iter()
            .filter(|utxo| utxo.value > self.config.dummy_utxo_value)
            .collect();
        sorted.sort_by(|a, b| b.value.cmp(&a.value));

        let mut selected = Vec::new();
        let mut selected_amount = 0u64;
        let mut required = amount
            + self
                .fees
                .estimate_fee(existing_inputs, existing_outputs, tier, true)?;

        for utxo in sorted {
            if !self.inscription_safety(utxo).is_spendable() {
                continue;
            }
            selected.push(utxo.clone());
            selected_amount += utxo.value;

            required = amount
                + self.fees.estimate_fee(
                    existing_inputs + selected.len(),
                    existing_outputs,
                    tier,
                    true,
                )?;
            if selected_amount >= required {
                debug!(
                    "selected {} payment utxos worth {selected_amount} sats for {required} sats",
                    selected.len()
                );
                return Ok(selected);
            }
        }

        Err(OrdexError::InsufficientFunds {
            required,
            available: selected_amount,
        })
    }
}
