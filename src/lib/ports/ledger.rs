use std::future::Future;
use std::sync::Arc;

use alloy::primitives::{Address, B256, Bytes};

use super::TxReceipt;
use crate::domain::ciphertext::FlatCiphertext;
use crate::domain::transfer::PendingSlot;

/// Everything `processPendingTransfer` needs to apply one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationSubmission {
    /// Proof over the run's `ProofInput`
    pub proof: Bytes,
    /// Claimed queue indexes, in selection order
    pub selected_indexes: Vec<u64>,
    /// Receives the fees of the claimed transfers
    pub fee_recipient: Address,
    /// Account whose balance is updated (packed public key)
    pub account: B256,
    /// New balance in on-chain encoding
    pub new_balance: FlatCiphertext,
}

/// Read side of the private token ledger.
///
/// Nothing read here is cached between runs; every run starts from fresh reads.
///
/// Implementations:
/// - `EthereumLedger` (alloy)
/// - `MockLedger` for testing and the demo
pub trait LedgerReader: Send + Sync {
    /// Current encrypted balance of `account`.
    fn balance(
        &self,
        account: B256,
    ) -> impl Future<Output = Result<FlatCiphertext, LedgerError>> + Send;

    /// Length of the pending-transfer queue, including emptied slots.
    fn pending_transfer_count(
        &self,
        account: B256,
    ) -> impl Future<Output = Result<u64, LedgerError>> + Send;

    /// Queue slot at `index`, tagged `Empty` if it was deleted or never set.
    fn pending_transfer(
        &self,
        account: B256,
        index: u64,
    ) -> impl Future<Output = Result<PendingSlot, LedgerError>> + Send;
}

/// Write side of the private token ledger.
pub trait LedgerWriter: Send + Sync {
    /// Apply an aggregation. Fails if the proof is rejected or any selected
    /// index no longer holds the transfer that was proven.
    fn submit_aggregation(
        &self,
        submission: &AggregationSubmission,
    ) -> impl Future<Output = Result<TxReceipt, LedgerError>> + Send;
}

impl<T: LedgerReader + ?Sized> LedgerReader for Arc<T> {
    fn balance(
        &self,
        account: B256,
    ) -> impl Future<Output = Result<FlatCiphertext, LedgerError>> + Send {
        (**self).balance(account)
    }

    fn pending_transfer_count(
        &self,
        account: B256,
    ) -> impl Future<Output = Result<u64, LedgerError>> + Send {
        (**self).pending_transfer_count(account)
    }

    fn pending_transfer(
        &self,
        account: B256,
        index: u64,
    ) -> impl Future<Output = Result<PendingSlot, LedgerError>> + Send {
        (**self).pending_transfer(account, index)
    }
}

impl<T: LedgerWriter + ?Sized> LedgerWriter for Arc<T> {
    fn submit_aggregation(
        &self,
        submission: &AggregationSubmission,
    ) -> impl Future<Output = Result<TxReceipt, LedgerError>> + Send {
        (**self).submit_aggregation(submission)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("transaction reverted: {0}")]
    TransactionReverted(String),

    #[error("pending transfer {index} is no longer queued")]
    StaleIndex { index: u64 },

    #[error("queue index {0} cannot be encoded for the contract")]
    IndexOutOfRange(u64),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
