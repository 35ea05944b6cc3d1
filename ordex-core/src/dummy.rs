//! Dummy UTXO preparation.
//!
//! A buyer needs two small inscription-free outputs before a purchase can be
//! built. This PSBT splits spendable funds into exactly that.

use crate::{
    buyer::{buyer_input, BuyerSigner},
    error::Result,
    fees::FeeTier,
    types::Utxo,
    utils::{parse_address, psbt_to_base64, NestedSegwit},
    OrdexError,
};
use bitcoin::{absolute::LockTime, psbt::Psbt, transaction::Version, Amount, Transaction, TxOut};
use log::{debug, info};

/// Number of dummy outputs created by one preparation transaction
const DUMMY_OUTPUTS: usize = 2;

impl BuyerSigner<'_> {
    /// Build an unsigned PSBT paying two dummy-value outputs back to `address`.
    ///
    /// Safe candidates are spent in the given order until they cover both
    /// dummies plus the fee. Change goes back to `address` when it clears the
    /// dust threshold.
    pub fn generate_unsigned_create_dummy_utxos_psbt(
        &self,
        address: &str,
        buyer_public_key: Option<&str>,
        candidates: &[Utxo],
        tier: FeeTier,
    ) -> Result<String> {
        let config = self.config();
        let owner = parse_address(address, config.network)?;
        let nested = NestedSegwit::for_address(address, buyer_public_key, config.network)?;
        let fees = self.fee_estimator();
        let selector = self.selector();
        let target = config.dummy_utxo_value * DUMMY_OUTPUTS as u64;

        let mut txins = Vec::new();
        let mut inputs = Vec::new();
        let mut total = 0u64;
        let mut fee = fees.estimate_fee(0, DUMMY_OUTPUTS, tier, true)?;

        for utxo in candidates {
            if !selector.inscription_safety(utxo).is_spendable() {
                continue;
            }
            let (txin, input) = buyer_input(utxo, nested.as_ref());
            txins.push(txin);
            inputs.push(input);
            total += utxo.value;

            fee = fees.estimate_fee(txins.len(), DUMMY_OUTPUTS, tier, true)?;
            if total >= target + fee {
                break;
            }
        }

        if total < target + fee {
            debug!("dummy preparation for {address}: have {total}, need {}", target + fee);
            return Err(OrdexError::invalid("pending transactions or not enough funds"));
        }

        let mut outputs: Vec<TxOut> = (0..DUMMY_OUTPUTS)
            .map(|_| TxOut {
                value: Amount::from_sat(config.dummy_utxo_value),
                script_pubkey: owner.script_pubkey(),
            })
            .collect();
        let change = total - target - fee;
        if config.is_above_dust(change) {
            outputs.push(TxOut {
                value: Amount::from_sat(change),
                script_pubkey: owner.script_pubkey(),
            });
        }

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: txins,
            output: outputs,
        };
        let mut psbt = Psbt::from_unsigned_tx(tx)?;
        psbt.inputs = inputs;

        info!(
            "prepared {DUMMY_OUTPUTS} dummy outputs for {address} from {} inputs",
            psbt.inputs.len()
        );
        Ok(psbt_to_base64(&psbt))
    }
}
