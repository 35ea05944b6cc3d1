//! Error types for ordex-core

use thiserror::Error;

/// Result type alias for ordex operations
pub type Result<T> = std::result::Result<T, OrdexError>;

/// Error types for listing, buying and merge operations
#[derive(Error, Debug)]
pub enum OrdexError {
    /// Protocol or caller violation: bad signature, wrong amount, wrong
    /// address, location mismatch. Never retried.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The candidate or chosen UTXOs do not cover outputs plus fee
    #[error("Insufficient funds: required {required} sats, available {available} sats")]
    InsufficientFunds {
        /// Total value the transaction needs, fee included
        required: u64,
        /// Total value that could be gathered
        available: u64,
    },

    /// Failure reported by an external collaborator, passed through as-is
    #[error(transparent)]
    Provider(#[from] anyhow::Error),

    /// PSBT decoding or construction errors
    #[error("PSBT error: {0}")]
    Psbt(#[from] bitcoin::psbt::Error),

    /// PSBT transaction extraction errors
    #[error("PSBT extraction error: {0}")]
    Extract(#[from] bitcoin::psbt::ExtractTxError),

    /// Base64 decoding errors
    #[error("Base64 decoding error: {0}")]
    Base64(#[from] bitcoin::base64::DecodeError),

    /// Address parsing errors
    #[error("Invalid address: {0}")]
    Address(#[from] bitcoin::address::ParseError),

    /// Secp256k1 errors
    #[error("Secp256k1 error: {0}")]
    Secp256k1(#[from] bitcoin::secp256k1::Error),

    /// Hex decoding errors
    #[error("Hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl OrdexError {
    /// Shorthand for the invalid-argument class
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    /// Whether this error belongs to the invalid-argument class
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::InsufficientFunds { .. }
        )
    }

    /// Missing satoshis for an insufficient-funds error
    pub fn shortfall(&self) -> Option<u64> {
        match self {
            Self::InsufficientFunds {
                required,
                available,
            } => Some(required.saturating_sub(*available)),
            _ => None,
        }
    }
}
