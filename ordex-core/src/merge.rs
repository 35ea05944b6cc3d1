//! # PSBT Merge
//!
//! Attaches the seller's signed input to the buyer-signed transaction. Nothing
//! else in the buying PSBT is touched, so the buyer's signatures stay valid.

use crate::{
    error::Result,
    layout::TxLayout,
    types::ListingState,
    utils::{psbt_from_base64, psbt_to_base64},
    OrdexError,
};
use bitcoin::{psbt::Psbt, Transaction};
use log::info;

/// Splice the sole input of the signed listing into the signed buying PSBT
/// at the seller index
pub fn merge_signed_buying_psbt(signed_listing: &Psbt, signed_buying: &Psbt) -> Result<Psbt> {
    let seller_index = TxLayout::TWO_DUMMY.seller_index;

    let ([seller_txin], [seller_input]) = (
        signed_listing.unsigned_tx.input.as_slice(),
        signed_listing.inputs.as_slice(),
    ) else {
        return Err(OrdexError::invalid(
            "signed listing must have exactly one input",
        ));
    };
    let buying_seller_txin = signed_buying
        .unsigned_tx
        .input
        .get(seller_index)
        .filter(|_| signed_buying.inputs.len() > seller_index);
    let Some(buying_seller_txin) = buying_seller_txin else {
        return Err(OrdexError::invalid(format!(
            "signed buying PSBT has no input {seller_index}"
        )));
    };
    if buying_seller_txin.previous_output != seller_txin.previous_output {
        return Err(OrdexError::invalid(format!(
            "listing spends {}, but buying input {seller_index} spends {}",
            seller_txin.previous_output, buying_seller_txin.previous_output
        )));
    }

    let mut merged = signed_buying.clone();
    merged.unsigned_tx.input[seller_index] = seller_txin.clone();
    merged.inputs[seller_index] = seller_input.clone();
    Ok(merged)
}

/// [`merge_signed_buying_psbt`] over base64 PSBTs
pub fn merge_signed_buying_psbt_base64(
    signed_listing_base64: &str,
    signed_buying_base64: &str,
) -> Result<String> {
    let listing = psbt_from_base64(signed_listing_base64)?;
    let buying = psbt_from_base64(signed_buying_base64)?;
    let merged = merge_signed_buying_psbt(&listing, &buying)?;
    Ok(psbt_to_base64(&merged))
}

/// Final transaction of a merged PSBT; every input must already be finalized
pub fn extract_merged_transaction(merged: &Psbt) -> Result<Transaction> {
    if let Some(index) = merged
        .inputs
        .iter()
        .position(|input| input.final_script_witness.is_none() && input.final_script_sig.is_none())
    {
        return Err(OrdexError::invalid(format!("input {index} is not finalized")));
    }
    Ok(merged.clone().extract_tx()?)
}

/// Merge the signed halves stored on a listing and record the result
pub fn merge_listing(listing: &mut ListingState) -> Result<String> {
    let signed_listing = listing
        .seller
        .signed_listing_psbt_base64
        .clone()
        .ok_or_else(|| OrdexError::invalid("listing is not signed by the seller"))?;
    let artifact_id = listing.seller.artifact.id.clone();
    let buyer = listing
        .buyer
        .as_mut()
        .ok_or_else(|| OrdexError::invalid("Buyer address is not set"))?;
    let signed_buying = buyer
        .signed_buying_psbt_base64
        .as_deref()
        .ok_or_else(|| OrdexError::invalid("buying PSBT is not signed by the buyer"))?;

    let merged = merge_signed_buying_psbt_base64(&signed_listing, signed_buying)?;
    buyer.merged_signed_buying_psbt_base64 = Some(merged.clone());
    info!("merged seller signature for {artifact_id}");
    Ok(merged)
}
