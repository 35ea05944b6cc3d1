//! Fixed input and output positions of the buying transaction.
//!
//! The seller signs a single input with `SIGHASH_SINGLE | ANYONECANPAY`, which
//! commits to the output carrying the same index. Every position below is
//! therefore part of the protocol: the builder writes them and the verifier
//! reads them from the same descriptor.
//!
//! ```text
//! inputs:  [dummy0, dummy1, seller, payment0 .. paymentN]
//! outputs: [dummy refresh, buyer receive, seller, (platform fee), dummy, dummy, (change)]
//! ```

use crate::{error::Result, OrdexError};

/// Named positions of the buying transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxLayout {
    /// Number of dummy inputs placed ahead of the seller input
    pub dummy_inputs: usize,
    /// Output returning dummy capital plus the inscription offset
    pub dummy_refresh_output: usize,
    /// Output paying postage to the buyer's token receive address
    pub buyer_receive_output: usize,
    /// Seller input and output index
    pub seller_index: usize,
    /// Optional platform fee output
    pub platform_fee_output: usize,
    /// Fresh dummy outputs created for the buyer's next purchase
    pub new_dummy_outputs: usize,
}

impl TxLayout {
    /// The two-dummy layout
    pub const TWO_DUMMY: TxLayout = TxLayout {
        dummy_inputs: 2,
        dummy_refresh_output: 0,
        buyer_receive_output: 1,
        seller_index: 2,
        platform_fee_output: 3,
        new_dummy_outputs: 2,
    };

    /// Check that the positions are mutually consistent.
    ///
    /// The seller input must directly follow the dummies, and the seller output
    /// must share its index so the single-output signature covers it.
    pub fn validate(&self) -> Result<()> {
        if self.dummy_inputs == 0 {
            return Err(OrdexError::invalid("layout needs at least one dummy input"));
        }
        if self.seller_index != self.dummy_inputs {
            return Err(OrdexError::invalid(format!(
                "seller index {} must follow {} dummy inputs",
                self.seller_index, self.dummy_inputs
            )));
        }
        let fixed = [
            self.dummy_refresh_output,
            self.buyer_receive_output,
            self.seller_index,
            self.platform_fee_output,
        ];
        if fixed.windows(2).any(|pair| pair[1] != pair[0] + 1) {
            return Err(OrdexError::invalid(
                "dummy refresh, buyer receive, seller and platform fee outputs must be contiguous",
            ));
        }
        if self.dummy_refresh_output != 0 {
            return Err(OrdexError::invalid("dummy refresh output must come first"));
        }
        Ok(())
    }

    /// Index of the first payment input
    pub fn first_payment_input(&self) -> usize {
        self.seller_index + 1
    }

    /// Offset of the next free output slot reported by buying verification.
    ///
    /// The dummy refresh output absorbs the inscription offset, so the
    /// purchased inscription always lands at offset zero of its new output.
    pub fn next_output_offset(&self) -> u64 {
        0
    }
}

impl Default for TxLayout {
    fn default() -> Self {
        Self::TWO_DUMMY
    }
}
