//! # Listing PSBT
//!
//! The seller signs exactly one input, the output holding the artifact, with
//! `SIGHASH_SINGLE | ANYONECANPAY`. That signature commits only to this input
//! and to the output at the same index, so the buyer can later wrap it in a
//! transaction with any other inputs and outputs as long as the seller output
//! stays at the seller index.

use crate::{
    config::MarketConfig,
    error::Result,
    fees::seller_ord_output_value,
    providers::{ArtifactIndex, FeeScheduleProvider, NodeRpc},
    types::{ListingRequest, ListingState, SellerState},
    utils::{parse_address, parse_x_only_key, psbt_from_base64, psbt_to_base64},
    OrdexError,
};
use bitcoin::{
    absolute::LockTime,
    psbt::{self, Psbt, PsbtSighashType},
    sighash::{EcdsaSighashType, TapSighashType},
    transaction::Version,
    Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use log::{debug, info};

/// The seller's input and output, as placed in both the listing PSBT and the
/// buying PSBT
#[derive(Clone, Debug)]
pub(crate) struct SellerLeg {
    pub(crate) txin: TxIn,
    pub(crate) input: psbt::Input,
    pub(crate) output: TxOut,
}

impl SellerLeg {
    /// Value of the artifact's output
    pub(crate) fn input_value(&self) -> u64 {
        self.input
            .witness_utxo
            .as_ref()
            .map(|utxo| utxo.value.to_sat())
            .unwrap_or_default()
    }
}

/// Build the seller input and output from the artifact's current holding
/// transaction.
pub(crate) fn seller_leg(
    config: &MarketConfig,
    node: &dyn NodeRpc,
    seller: &SellerState,
) -> Result<SellerLeg> {
    let outpoint = seller.artifact.output();
    let mut holding_tx = node.get_raw_transaction(&outpoint.txid)?;

    let tap_internal_key = seller
        .tap_internal_key
        .as_deref()
        .map(parse_x_only_key)
        .transpose()?;

    // Cached witness data would make the reconstructed transaction diverge
    if tap_internal_key.is_none() {
        for txin in holding_tx.input.iter_mut() {
            txin.witness.clear();
        }
    }

    let prev_out = holding_tx
        .output
        .get(outpoint.vout as usize)
        .cloned()
        .ok_or_else(|| {
            OrdexError::invalid(format!(
                "holding transaction {} has no output {}",
                outpoint.txid, outpoint.vout
            ))
        })?;

    let sighash_type = match tap_internal_key {
        Some(_) => PsbtSighashType::from(TapSighashType::SinglePlusAnyoneCanPay),
        None => PsbtSighashType::from(EcdsaSighashType::SinglePlusAnyoneCanPay),
    };

    let input = psbt::Input {
        non_witness_utxo: Some(holding_tx),
        witness_utxo: Some(prev_out),
        sighash_type: Some(sighash_type),
        tap_internal_key,
        ..Default::default()
    };

    let receive_address = parse_address(&seller.seller_receive_address, config.network)?;
    let output = TxOut {
        value: Amount::from_sat(seller_ord_output_value(
            seller.price,
            seller.maker_fee_bp,
            seller.artifact.output_value,
        )),
        script_pubkey: receive_address.script_pubkey(),
    };

    Ok(SellerLeg {
        txin: TxIn {
            previous_output: outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        },
        input,
        output,
    })
}

/// Builds and verifies listing PSBTs
pub struct SellerSigner<'a> {
    config: &'a MarketConfig,
    node: &'a dyn NodeRpc,
}

impl<'a> SellerSigner<'a> {
    /// Create a signer for the given market
    pub fn new(config: &'a MarketConfig, node: &'a dyn NodeRpc) -> Self {
        Self { config, node }
    }

    /// Build the unsigned single-input, single-output listing PSBT
    pub fn build_listing_psbt(&self, seller: &SellerState) -> Result<Psbt> {
        let leg = seller_leg(self.config, self.node, seller)?;
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![leg.txin],
            output: vec![leg.output],
        };
        let mut psbt = Psbt::from_unsigned_tx(tx)?;
        psbt.inputs[0] = leg.input;
        Ok(psbt)
    }

    /// Build the listing PSBT and store it on the listing
    pub fn generate_unsigned_listing_psbt(&self, listing: &mut ListingState) -> Result<()> {
        let psbt = self.build_listing_psbt(&listing.seller)?;
        debug!(
            "listing {} pays seller {} sats",
            listing.seller.artifact.id,
            psbt.unsigned_tx.output[0].value.to_sat()
        );
        listing.seller.unsigned_listing_psbt_base64 = Some(psbt_to_base64(&psbt));
        Ok(())
    }

    /// Check a signed listing against the live artifact and fee schedule.
    ///
    /// The maker fee and the artifact's output value come from the
    /// collaborators, never from the request.
    pub fn verify_signed_listing_psbt(
        &self,
        req: &ListingRequest,
        fees: &dyn FeeScheduleProvider,
        artifacts: &dyn ArtifactIndex,
    ) -> Result<()> {
        let psbt = psbt_from_base64(&req.signed_listing_psbt_base64)?;

        let analysis = self.node.analyze_psbt(&req.signed_listing_psbt_base64)?;
        if !analysis.first().is_some_and(|input| input.is_final) {
            return Err(OrdexError::invalid("Invalid signature"));
        }

        if psbt.unsigned_tx.input.len() != 1 {
            return Err(OrdexError::invalid("Invalid number of inputs"));
        }
        let output = psbt.unsigned_tx.input[0].previous_output;

        let artifact = match artifacts.get_artifact_by_output(&output)? {
            Some(artifact) if artifact.id == req.token_id => artifact,
            _ => return Err(OrdexError::invalid("Invalid tokenId")),
        };

        let [seller_output] = psbt.unsigned_tx.output.as_slice() else {
            return Err(OrdexError::invalid("Invalid number of outputs"));
        };

        let maker_fee_bp = fees.get_maker_fee_bp(&artifact.owner)?;
        let expected = seller_ord_output_value(req.price, maker_fee_bp, artifact.output_value);
        if seller_output.value.to_sat() != expected {
            return Err(OrdexError::invalid(format!(
                "Invalid price, expect {expected}, but got {}",
                seller_output.value.to_sat()
            )));
        }

        let receive_address = parse_address(&req.seller_receive_address, self.config.network)
            .map_err(|_| OrdexError::invalid("Invalid sellerReceiveAddress"))?;
        if seller_output.script_pubkey != receive_address.script_pubkey() {
            return Err(OrdexError::invalid("Invalid sellerReceiveAddress"));
        }

        info!("verified listing of {} at {} sats", artifact.id, req.price);
        Ok(())
    }
}
