use alloy::primitives::U256;

use super::ciphertext::{Ciphertext, FlatCiphertext};

/// A populated entry of an account's pending-transfer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTransfer {
    /// Encrypted amount under the recipient's key
    pub amount: Ciphertext,
    /// Fee offered to whoever processes the transfer
    pub fee: U256,
}

/// One slot of the pending-transfer queue, tagged at the ledger boundary.
///
/// The contract deletes processed transfers by zeroing them, so a slot whose
/// four coordinates are all literal zero is `Empty` rather than a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingSlot {
    Present(PendingTransfer),
    Empty,
}

impl PendingSlot {
    /// Tag a raw `(ciphertext, fee)` pair read from the ledger.
    pub fn from_raw(amount: FlatCiphertext, fee: U256) -> Self {
        let amount = amount.to_ciphertext();
        if amount.is_zero() {
            Self::Empty
        } else {
            Self::Present(PendingTransfer { amount, fee })
        }
    }

    pub fn present(amount: Ciphertext, fee: U256) -> Self {
        Self::from_raw(amount.to_flat(), fee)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn transfer(&self) -> Option<&PendingTransfer> {
        match self {
            Self::Present(transfer) => Some(transfer),
            Self::Empty => None,
        }
    }
}
