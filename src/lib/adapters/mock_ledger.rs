use std::collections::HashMap;

use alloy::primitives::{B256, U256};
use tokio::sync::Mutex;

use crate::domain::ciphertext::{Ciphertext, FlatCiphertext};
use crate::domain::transfer::PendingSlot;
use crate::ports::ledger::{AggregationSubmission, LedgerError, LedgerReader, LedgerWriter};
use crate::ports::TxReceipt;

/// One raw queue slot as the contract stores it.
type RawSlot = (FlatCiphertext, U256);

/// In-memory private token ledger for coordinator tests and the demo.
///
/// Mirrors the contract's storage: unknown accounts read as the all-zero
/// balance, reads past the end of a queue return an all-zero slot, and a
/// processed transfer is zeroed in place without shrinking the queue.
pub struct MockLedger {
    balances: Mutex<HashMap<B256, FlatCiphertext>>,
    queues: Mutex<HashMap<B256, Vec<RawSlot>>>,
    submissions: Mutex<Vec<AggregationSubmission>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub async fn set_balance(&self, account: B256, balance: Ciphertext) {
        self.balances.lock().await.insert(account, balance.to_flat());
    }

    /// Append a pending transfer and return its queue index.
    pub async fn push_transfer(&self, account: B256, amount: Ciphertext, fee: U256) -> u64 {
        let mut queues = self.queues.lock().await;
        let queue = queues.entry(account).or_default();
        queue.push((amount.to_flat(), fee));
        (queue.len() - 1) as u64
    }

    /// Zero a queue slot, as another process claiming it would.
    pub async fn clear_transfer(&self, account: B256, index: u64) {
        if let Some(slot) = self
            .queues
            .lock()
            .await
            .get_mut(&account)
            .and_then(|q| q.get_mut(index as usize))
        {
            *slot = (FlatCiphertext::default(), U256::ZERO);
        }
    }

    /// Submissions accepted so far (for test assertions).
    pub async fn submissions(&self) -> Vec<AggregationSubmission> {
        self.submissions.lock().await.clone()
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerReader for MockLedger {
    async fn balance(&self, account: B256) -> Result<FlatCiphertext, LedgerError> {
        Ok(self
            .balances
            .lock()
            .await
            .get(&account)
            .copied()
            .unwrap_or_default())
    }

    async fn pending_transfer_count(&self, account: B256) -> Result<u64, LedgerError> {
        Ok(self
            .queues
            .lock()
            .await
            .get(&account)
            .map_or(0, |q| q.len() as u64))
    }

    async fn pending_transfer(&self, account: B256, index: u64) -> Result<PendingSlot, LedgerError> {
        let (amount, fee) = self
            .queues
            .lock()
            .await
            .get(&account)
            .and_then(|q| q.get(index as usize).copied())
            .unwrap_or_default();
        Ok(PendingSlot::from_raw(amount, fee))
    }
}

impl LedgerWriter for MockLedger {
    /// Accepts any non-empty proof. Rejects the whole submission if a selected
    /// slot is already empty.
    async fn submit_aggregation(
        &self,
        submission: &AggregationSubmission,
    ) -> Result<TxReceipt, LedgerError> {
        if submission.proof.is_empty() {
            return Err(LedgerError::TransactionReverted("empty proof".into()));
        }

        let mut balances = self.balances.lock().await;
        let mut queues = self.queues.lock().await;
        let queue = queues.entry(submission.account).or_default();

        for &index in &submission.selected_indexes {
            let live = queue
                .get(index as usize)
                .is_some_and(|(amount, _)| *amount != FlatCiphertext::default());
            if !live {
                return Err(LedgerError::StaleIndex { index });
            }
        }
        for &index in &submission.selected_indexes {
            queue[index as usize] = (FlatCiphertext::default(), U256::ZERO);
        }
        balances.insert(submission.account, submission.new_balance);

        let mut submissions = self.submissions.lock().await;
        submissions.push(submission.clone());
        Ok(TxReceipt {
            tx_hash: B256::from(U256::from(submissions.len())),
            success: true,
        })
    }
}
