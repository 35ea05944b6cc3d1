//! # Buying PSBT
//!
//! Builds the full multi-party transaction around the seller's pre-signed
//! input and output, and verifies a buyer-signed instance before it is merged
//! with the listing.

use crate::{
    config::MarketConfig,
    error::Result,
    fees::{platform_fee_value, seller_ord_output_value, FeeEstimator, FeeTier},
    layout::TxLayout,
    providers::{ArtifactIndex, FeeRateOracle, FeeScheduleProvider, NodeRpc},
    seller::seller_leg,
    types::{BuyingRequest, BuyingVerification, ListingState, Utxo},
    utils::{parse_address, psbt_from_base64, psbt_to_base64, NestedSegwit},
    utxo::UtxoSelector,
    OrdexError,
};
use bitcoin::{
    absolute::LockTime, psbt, psbt::Psbt, transaction::Version, Address, Amount, ScriptBuf,
    Sequence, Transaction, TxIn, TxOut, Witness,
};
use log::{debug, info};

/// Unsigned input spending one of the buyer's UTXOs
pub(crate) fn buyer_input(utxo: &Utxo, nested: Option<&NestedSegwit>) -> (TxIn, psbt::Input) {
    let mut input = psbt::Input {
        non_witness_utxo: Some(utxo.tx.clone()),
        ..Default::default()
    };
    if let Some(nested) = nested {
        input.witness_utxo = Some(TxOut {
            value: Amount::from_sat(utxo.value),
            script_pubkey: nested.script_pubkey.clone(),
        });
        input.redeem_script = Some(nested.redeem_script.clone());
    }

    let txin = TxIn {
        previous_output: utxo.outpoint(),
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::new(),
    };
    (txin, input)
}

/// Fail when the next pushed input or output would not land at the slot
/// the layout names for it
fn ensure_position(slot: &str, next: usize, expected: usize) -> Result<()> {
    if next != expected {
        return Err(OrdexError::invalid(format!(
            "{slot} would be placed at index {next}, layout expects {expected}"
        )));
    }
    Ok(())
}

/// Builds and verifies buying PSBTs
pub struct BuyerSigner<'a> {
    config: &'a MarketConfig,
    node: &'a dyn NodeRpc,
    artifacts: &'a dyn ArtifactIndex,
    fee_rates: &'a dyn FeeRateOracle,
    layout: TxLayout,
}

impl<'a> BuyerSigner<'a> {
    /// Create a signer over the two-dummy layout
    pub fn new(
        config: &'a MarketConfig,
        node: &'a dyn NodeRpc,
        artifacts: &'a dyn ArtifactIndex,
        fee_rates: &'a dyn FeeRateOracle,
    ) -> Self {
        Self {
            config,
            node,
            artifacts,
            fee_rates,
            layout: TxLayout::TWO_DUMMY,
        }
    }

    /// Layout shared by the builder and the verifier
    pub fn layout(&self) -> &TxLayout {
        &self.layout
    }

    pub(crate) fn config(&self) -> &'a MarketConfig {
        self.config
    }

    pub(crate) fn fee_estimator(&self) -> FeeEstimator<'a> {
        FeeEstimator::new(self.fee_rates)
    }

    /// Selector bound to this signer's collaborators
    pub fn selector(&self) -> UtxoSelector<'a> {
        UtxoSelector::new(self.config, self.node, self.artifacts, self.fee_estimator())
    }

    /// See [`UtxoSelector::select_dummy_utxos`]
    pub fn select_dummy_utxos(&self, candidates: &[Utxo]) -> Option<[Utxo; 2]> {
        self.selector().select_dummy_utxos(candidates)
    }

    /// See [`UtxoSelector::select_payment_utxos`]
    pub fn select_payment_utxos(
        &self,
        candidates: &[Utxo],
        amount: u64,
        existing_inputs: usize,
        existing_outputs: usize,
        tier: FeeTier,
    ) -> Result<Vec<Utxo>> {
        self.selector().select_payment_utxos(
            candidates,
            amount,
            existing_inputs,
            existing_outputs,
            tier,
        )
    }

    fn platform_fee_address(&self) -> Result<Address> {
        let address = self
            .config
            .platform_fee_address
            .as_deref()
            .ok_or_else(|| OrdexError::invalid("platform fee address is not configured"))?;
        parse_address(address, self.config.network)
    }

    /// Build the unsigned buying PSBT.
    ///
    /// ```text
    /// inputs:  [dummy0, dummy1, seller, payment0 .. paymentN]
    /// outputs: [dummy refresh, buyer receive, seller, (platform fee), dummy, dummy, (change)]
    /// ```
    pub fn build_buying_psbt(&self, listing: &ListingState) -> Result<Psbt> {
        self.layout.validate()?;
        let seller = &listing.seller;
        let buyer = listing.buyer()?;
        let network = self.config.network;

        if buyer.buyer_address.is_empty() || buyer.buyer_token_receive_address.is_empty() {
            return Err(OrdexError::invalid("Buyer address is not set"));
        }
        if buyer.buyer_dummy_utxos.len() != self.layout.dummy_inputs
            || buyer.buyer_payment_utxos.is_empty()
        {
            return Err(OrdexError::invalid("Buyer address has not enough utxos"));
        }

        let buyer_address = parse_address(&buyer.buyer_address, network)?;
        let receive_address = parse_address(&buyer.buyer_token_receive_address, network)?;
        let nested = NestedSegwit::for_address(
            &buyer.buyer_address,
            buyer.buyer_public_key.as_deref(),
            network,
        )?;

        let mut txins = Vec::new();
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut total_input = 0u64;

        for dummy in &buyer.buyer_dummy_utxos {
            let (txin, input) = buyer_input(dummy, nested.as_ref());
            txins.push(txin);
            inputs.push(input);
            total_input += dummy.value;
        }

        // Returns the dummies and absorbs the sats ahead of the inscription
        let dummy_total: u64 = buyer.buyer_dummy_utxos.iter().map(|u| u.value).sum();
        ensure_position(
            "dummy refresh output",
            outputs.len(),
            self.layout.dummy_refresh_output,
        )?;
        outputs.push(TxOut {
            value: Amount::from_sat(dummy_total + seller.artifact.offset()),
            script_pubkey: buyer_address.script_pubkey(),
        });
        ensure_position(
            "buyer receive output",
            outputs.len(),
            self.layout.buyer_receive_output,
        )?;
        outputs.push(TxOut {
            value: Amount::from_sat(self.config.ordinals_postage_value),
            script_pubkey: receive_address.script_pubkey(),
        });

        let leg = seller_leg(self.config, self.node, seller)?;
        ensure_position("seller input", txins.len(), self.layout.seller_index)?;
        ensure_position("seller output", outputs.len(), self.layout.seller_index)?;
        total_input += leg.input_value();
        txins.push(leg.txin);
        inputs.push(leg.input);
        outputs.push(leg.output);

        ensure_position(
            "first payment input",
            txins.len(),
            self.layout.first_payment_input(),
        )?;
        for payment in &buyer.buyer_payment_utxos {
            let (txin, input) = buyer_input(payment, nested.as_ref());
            txins.push(txin);
            inputs.push(input);
            total_input += payment.value;
        }

        let platform_fee =
            platform_fee_value(seller.price, seller.maker_fee_bp, buyer.taker_fee_bp)?;
        if self.config.is_above_dust(platform_fee) {
            ensure_position(
                "platform fee output",
                outputs.len(),
                self.layout.platform_fee_output,
            )?;
            outputs.push(TxOut {
                value: Amount::from_sat(platform_fee),
                script_pubkey: self.platform_fee_address()?.script_pubkey(),
            });
        }

        for _ in 0..self.layout.new_dummy_outputs {
            outputs.push(TxOut {
                value: Amount::from_sat(self.config.dummy_utxo_value),
                script_pubkey: buyer_address.script_pubkey(),
            });
        }

        // The estimate already counts one change output
        let fee = self.fee_estimator().estimate_fee(
            txins.len(),
            outputs.len(),
            buyer.fee_rate_tier,
            true,
        )?;
        let total_output: u64 = outputs.iter().map(|o| o.value.to_sat()).sum();
        let required = total_output.saturating_add(fee);
        if total_input < required {
            return Err(OrdexError::InsufficientFunds {
                required,
                available: total_input,
            });
        }

        let change = total_input - required;
        if self.config.is_above_dust(change) {
            outputs.push(TxOut {
                value: Amount::from_sat(change),
                script_pubkey: buyer_address.script_pubkey(),
            });
        }

        debug!(
            "buying {}: {} inputs, {} outputs, fee {fee}, change {change}",
            seller.artifact.id,
            txins.len(),
            outputs.len()
        );

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: txins,
            output: outputs,
        };
        let mut psbt = Psbt::from_unsigned_tx(tx)?;
        psbt.inputs = inputs;
        Ok(psbt)
    }

    /// Build the buying PSBT and store it on the listing
    pub fn generate_unsigned_buying_psbt(&self, listing: &mut ListingState) -> Result<()> {
        let psbt = self.build_buying_psbt(listing)?;
        let encoded = psbt_to_base64(&psbt);
        if let Some(buyer) = listing.buyer.as_mut() {
            buyer.unsigned_buying_psbt_input_size = Some(psbt.inputs.len());
            buyer.unsigned_buying_psbt_base64 = Some(encoded);
        }
        Ok(())
    }

    /// Check a buyer-signed PSBT before merge.
    ///
    /// Every buyer input must be final; the seller input is signed later by
    /// the merge. Seller payout and platform fee are recomputed from the
    /// claimed price and the live listing.
    pub fn verify_signed_buying_psbt(
        &self,
        req: &BuyingRequest,
        fees: &dyn FeeScheduleProvider,
    ) -> Result<BuyingVerification> {
        self.layout.validate()?;
        let network = self.config.network;
        let psbt = psbt_from_base64(&req.signed_buying_psbt_base64)?;
        let seller_index = self.layout.seller_index;
        let receive_index = self.layout.buyer_receive_output;

        let analysis = self.node.analyze_psbt(&req.signed_buying_psbt_base64)?;
        if analysis.len() != psbt.inputs.len() {
            return Err(OrdexError::invalid("Invalid number of analyzed inputs"));
        }
        for (index, input) in analysis.iter().enumerate() {
            if index != seller_index && !input.is_final {
                return Err(OrdexError::invalid("Invalid signature"));
            }
            if !input.has_utxo {
                return Err(OrdexError::invalid("Missing utxo"));
            }
        }

        let outputs = &psbt.unsigned_tx.output;
        let receive_output = outputs
            .get(receive_index)
            .ok_or_else(|| OrdexError::invalid("Missing buyer token receive output"))?;
        let receive_address = parse_address(&req.buyer_token_receive_address, network)
            .map_err(|_| OrdexError::invalid("Invalid buyer token receive address"))?;
        if receive_output.script_pubkey != receive_address.script_pubkey() {
            return Err(OrdexError::invalid("buyerTokenReceiveAddress mismatch"));
        }

        let seller_input = psbt
            .unsigned_tx
            .input
            .get(seller_index)
            .ok_or_else(|| OrdexError::invalid("Missing seller input"))?;
        let from_psbt = self
            .artifacts
            .get_artifact_by_output(&seller_input.previous_output)?;
        let from_req = self.artifacts.get_artifact_by_id(&req.token_id)?;
        let (Some(from_psbt), Some(artifact)) = (from_psbt, from_req) else {
            return Err(OrdexError::invalid("artifact not found from psbt or request"));
        };
        if from_psbt.location != artifact.location {
            return Err(OrdexError::invalid("artifact location mismatch"));
        }

        let maker_fee_bp = artifact
            .listed_maker_fee_bp
            .ok_or_else(|| OrdexError::invalid("Invalid artifact listedMakerFeeBp"))?;
        let seller_output = outputs
            .get(seller_index)
            .ok_or_else(|| OrdexError::invalid("Missing seller output"))?;
        let expected_seller_value =
            seller_ord_output_value(req.price, maker_fee_bp, artifact.output_value);
        if seller_output.value.to_sat() != expected_seller_value {
            return Err(OrdexError::invalid(format!(
                "Invalid seller payout, expect {expected_seller_value}, but got {}",
                seller_output.value.to_sat()
            )));
        }

        let seller_receive_address = artifact
            .listed_seller_receive_address
            .as_deref()
            .ok_or_else(|| OrdexError::invalid("Invalid seller receive address"))
            .and_then(|address| {
                parse_address(address, network)
                    .map_err(|_| OrdexError::invalid("Invalid seller receive address"))
            })?;
        if seller_output.script_pubkey != seller_receive_address.script_pubkey() {
            return Err(OrdexError::invalid("Invalid seller receive address"));
        }

        if receive_output.value.to_sat() != self.config.ordinals_postage_value {
            return Err(OrdexError::invalid(
                "Invalid buyer token receive output postage value",
            ));
        }

        let taker_fee_bp = fees.get_taker_fee_bp(&req.buyer_address)?;
        let expected_platform_fee = platform_fee_value(req.price, maker_fee_bp, taker_fee_bp)?;
        if self.config.is_above_dust(expected_platform_fee) {
            let fee_output = outputs
                .get(self.layout.platform_fee_output)
                .ok_or_else(|| OrdexError::invalid("Missing platform fee output"))?;
            if fee_output.value.to_sat() != expected_platform_fee {
                return Err(OrdexError::invalid(format!(
                    "Invalid platform fee, expect {expected_platform_fee}, but got {}",
                    fee_output.value.to_sat()
                )));
            }
            if fee_output.script_pubkey != self.platform_fee_address()?.script_pubkey() {
                return Err(OrdexError::invalid("Invalid platform fee address"));
            }
        }

        info!("verified buying of {} at {} sats", artifact.id, req.price);
        Ok(BuyingVerification {
            new_output_offset: self.layout.next_output_offset(),
        })
    }
}
