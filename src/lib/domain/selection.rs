use std::fmt;

use alloy::primitives::U256;
use tracing::debug;

use super::aggregation::{AggregationError, BalanceAccumulator};
use super::ciphertext::Ciphertext;
use super::transfer::{PendingSlot, PendingTransfer};
use crate::ports::curve::CurveArithmetic;

/// Maximum number of pending transfers claimed by one aggregation run.
///
/// Must match the `encrypted_values` array length (divided by two) in the
/// `process_pending_transfers` circuit.
pub const DEFAULT_MAX_TRANSFERS: usize = 4;

/// Which pending transfers a run claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPolicy {
    /// `K`: selection stops once this many transfers are claimed
    pub max_transfers: usize,
    /// A transfer is claimed only if its fee is strictly greater than this
    pub min_fee: U256,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            max_transfers: DEFAULT_MAX_TRANSFERS,
            min_fee: U256::ZERO,
        }
    }
}

impl SelectionPolicy {
    pub fn new(max_transfers: usize, min_fee: U256) -> Self {
        Self {
            max_transfers,
            min_fee,
        }
    }

    /// Fee above threshold and a non-zero `C1.x`.
    pub fn is_eligible(&self, transfer: &PendingTransfer) -> bool {
        self.check(transfer).is_ok()
    }

    /// Like [`is_eligible`](Self::is_eligible), naming the first rule that
    /// rejects the transfer. The fee is checked first.
    pub fn check(&self, transfer: &PendingTransfer) -> Result<(), Ineligible> {
        if transfer.fee <= self.min_fee {
            Err(Ineligible::FeeTooLow)
        } else if transfer.amount.c1.x.is_zero() {
            Err(Ineligible::ZeroC1x)
        } else {
            Ok(())
        }
    }
}

/// Why a present transfer is not claimed. It is still folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    /// `fee <= min_fee`
    FeeTooLow,
    /// `C1.x == 0`
    ZeroC1x,
}

impl fmt::Display for Ineligible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FeeTooLow => f.write_str("fee not above min fee"),
            Self::ZeroC1x => f.write_str("C1.x is zero"),
        }
    }
}

/// A queue entry claimed for the proof and the on-chain index list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedTransfer {
    pub index: u64,
    pub amount: Ciphertext,
    pub fee: U256,
}

/// Whether the scan can take another slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    Continue,
    /// `max_transfers` reached; remaining slots stay queued for a later run.
    Full,
}

/// Result of scanning an account's pending-transfer queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Balance read from the ledger at the start of the run
    pub old_balance: Ciphertext,
    /// `old_balance` plus every non-empty scanned transfer
    pub new_balance: Ciphertext,
    /// Claimed transfers, ascending by queue index
    pub selected: Vec<SelectedTransfer>,
    /// Indexes folded into `new_balance`, ascending
    pub folded: Vec<u64>,
    /// Indexes skipped because the slot was empty
    pub skipped_empty: Vec<u64>,
    /// Number of slots examined (`0..scanned`)
    pub scanned: u64,
}

impl ScanOutcome {
    /// The index list handed to the contract, in selection order.
    pub fn selected_indexes(&self) -> Vec<u64> {
        self.selected.iter().map(|t| t.index).collect()
    }

    pub fn selected_amounts(&self) -> Vec<Ciphertext> {
        self.selected.iter().map(|t| t.amount).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Incremental queue scan.
///
/// Slots are pushed one at a time starting at index 0 so the caller can stop
/// fetching from the ledger as soon as the scan reports `Full`. Selection
/// and folding use separate conditions:
///
/// - a slot is *selected* when the policy deems it eligible;
/// - a slot is *folded* into the balance whenever it is not empty, whatever
///   its fee.
///
/// The slot that fills the selection is folded before the scan stops.
pub struct TransferScan<C> {
    policy: SelectionPolicy,
    old_balance: Ciphertext,
    accumulator: BalanceAccumulator<C>,
    selected: Vec<SelectedTransfer>,
    skipped_empty: Vec<u64>,
    next_index: u64,
}

impl<C: CurveArithmetic> TransferScan<C> {
    pub fn new(policy: SelectionPolicy, curve: C, current_balance: Ciphertext) -> Self {
        Self {
            policy,
            old_balance: current_balance,
            accumulator: BalanceAccumulator::new(curve, current_balance),
            selected: Vec::with_capacity(policy.max_transfers),
            skipped_empty: Vec::new(),
            next_index: 0,
        }
    }

    /// Queue index the next pushed slot is taken to be.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn is_full(&self) -> bool {
        self.selected.len() >= self.policy.max_transfers
    }

    /// Process the slot at `next_index()`.
    pub fn push(&mut self, slot: PendingSlot) -> Result<ScanStep, AggregationError> {
        if self.is_full() {
            return Ok(ScanStep::Full);
        }

        let index = self.next_index;
        self.next_index += 1;

        if let PendingSlot::Present(transfer) = &slot {
            if self.policy.is_eligible(transfer) {
                self.selected.push(SelectedTransfer {
                    index,
                    amount: transfer.amount,
                    fee: transfer.fee,
                });
            }
        }

        match slot {
            PendingSlot::Empty => {
                debug!(index, "pending transfer is empty, deleted or never set");
                self.skipped_empty.push(index);
            }
            PendingSlot::Present(transfer) => {
                debug!(index, fee = %transfer.fee, "folding pending transfer");
                self.accumulator.fold(index, &transfer.amount)?;
            }
        }

        if self.is_full() {
            Ok(ScanStep::Full)
        } else {
            Ok(ScanStep::Continue)
        }
    }

    pub fn finish(self) -> ScanOutcome {
        let (new_balance, folded) = self.accumulator.into_parts();
        ScanOutcome {
            old_balance: self.old_balance,
            new_balance,
            selected: self.selected,
            folded,
            skipped_empty: self.skipped_empty,
            scanned: self.next_index,
        }
    }
}

/// Scan an in-memory queue (slot `i` of the iterator is queue index `i`).
pub fn scan_queue<C, I>(
    policy: SelectionPolicy,
    curve: C,
    current_balance: Ciphertext,
    slots: I,
) -> Result<ScanOutcome, AggregationError>
where
    C: CurveArithmetic,
    I: IntoIterator<Item = PendingSlot>,
{
    let mut scan = TransferScan::new(policy, curve, current_balance);
    if !scan.is_full() {
        for slot in slots {
            if scan.push(slot)? == ScanStep::Full {
                break;
            }
        }
    }
    Ok(scan.finish())
}
