use std::fmt;

use alloy::primitives::{Address, B256};
use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::aggregation::AggregationError;
use crate::domain::ciphertext::FlatCiphertext;
use crate::domain::proof_input::{ProofInput, ProofInputError};
use crate::domain::selection::{ScanOutcome, ScanStep, SelectionPolicy, TransferScan};
use crate::ports::curve::CurveArithmetic;
use crate::ports::ledger::{AggregationSubmission, LedgerError, LedgerReader, LedgerWriter};
use crate::ports::prover::{Prover, ProverError};
use crate::ports::{AggregationProof, TxReceipt};

/// Which ledger read failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStage {
    Balance,
    QueueLength,
    Transfer { index: u64 },
    /// Re-reading a selected transfer just before submission
    Recheck { index: u64 },
}

impl fmt::Display for ReadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Balance => f.write_str("balance"),
            Self::QueueLength => f.write_str("pending transfer count"),
            Self::Transfer { index } => write!(f, "pending transfer {index}"),
            Self::Recheck { index } => write!(f, "recheck of pending transfer {index}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("reading {stage} failed: {source}")]
    LedgerRead {
        stage: ReadStage,
        #[source]
        source: LedgerError,
    },

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("proof input: {0}")]
    ProofInput(#[from] ProofInputError),

    #[error("prover: {0}")]
    Prover(#[from] ProverError),

    #[error("selected pending transfer {index} changed since it was read")]
    StaleSelection { index: u64 },

    #[error("submission failed: {0}")]
    Submission(#[source] LedgerError),

    #[error("cannot {action} in state {state:?}")]
    InvalidState {
        action: &'static str,
        state: RunState,
    },

    #[error("no pending transfer is eligible for processing")]
    NothingToProcess,
}

/// What to do when a run selects no transfers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyQueuePolicy {
    /// Stop after the scan. Nothing is proven or submitted.
    #[default]
    Skip,
    /// Prove and submit a fully padded aggregation with an empty index list.
    Submit,
}

/// Coordinator lifecycle. `Failed` is terminal for the run; `init` starts a
/// new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Initialized,
    ProofRequested,
    ProofReady,
    Submitted,
    Failed,
}

/// Result of the read / select / fold / assemble phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationRun {
    pub outcome: ScanOutcome,
    pub proof_input: ProofInput,
}

/// Result of [`ProcessTransferCoordinator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing selected and the policy is `Skip`.
    Skipped { scanned: u64 },
    Submitted {
        receipt: TxReceipt,
        selected_indexes: Vec<u64>,
        new_balance: FlatCiphertext,
    },
}

/// Drives one aggregation of an account's pending transfers:
/// read and fold (`init`), prove (`generate_proof`), and apply on-chain
/// (`submit`).
///
/// Generic over the ledger read and write ports, the prover, and the curve
/// backend. Nothing is retried: a failed step moves the run to `Failed`.
pub struct ProcessTransferCoordinator<R, W, P, C>
where
    R: LedgerReader,
    W: LedgerWriter,
    P: Prover,
    C: CurveArithmetic,
{
    reader: R,
    writer: W,
    prover: P,
    curve: C,
    /// Account being processed (packed public key)
    account: B256,
    fee_recipient: Address,
    policy: SelectionPolicy,
    empty_queue: EmptyQueuePolicy,
    state: RunState,
    run: Option<AggregationRun>,
    proof: Option<AggregationProof>,
    receipt: Option<TxReceipt>,
}

impl<R, W, P, C> ProcessTransferCoordinator<R, W, P, C>
where
    R: LedgerReader,
    W: LedgerWriter,
    P: Prover,
    C: CurveArithmetic,
{
    pub fn new(
        reader: R,
        writer: W,
        prover: P,
        curve: C,
        account: B256,
        fee_recipient: Address,
    ) -> Self {
        Self {
            reader,
            writer,
            prover,
            curve,
            account,
            fee_recipient,
            policy: SelectionPolicy::default(),
            empty_queue: EmptyQueuePolicy::default(),
            state: RunState::Idle,
            run: None,
            proof: None,
            receipt: None,
        }
    }

    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_empty_queue(mut self, empty_queue: EmptyQueuePolicy) -> Self {
        self.empty_queue = empty_queue;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    /// Set by `init`.
    pub fn aggregation(&self) -> Option<&AggregationRun> {
        self.run.as_ref()
    }

    pub fn proof(&self) -> Option<&AggregationProof> {
        self.proof.as_ref()
    }

    pub fn receipt(&self) -> Option<&TxReceipt> {
        self.receipt.as_ref()
    }

    /// Read the balance and queue, select and fold, and assemble the proof
    /// input. Always starts from fresh ledger reads, discarding any previous
    /// run.
    pub async fn init(&mut self) -> Result<&AggregationRun, CoordinatorError> {
        self.state = RunState::Idle;
        self.run = None;
        self.proof = None;
        self.receipt = None;

        match self.aggregate().await {
            Ok(run) => {
                info!(
                    account = %self.account,
                    selected = ?run.outcome.selected_indexes(),
                    folded = run.outcome.folded.len(),
                    skipped_empty = run.outcome.skipped_empty.len(),
                    scanned = run.outcome.scanned,
                    "pending transfers aggregated"
                );
                self.state = RunState::Initialized;
                Ok(self.run.insert(run))
            }
            Err(e) => self.fail(e),
        }
    }

    async fn aggregate(&self) -> Result<AggregationRun, CoordinatorError> {
        let account = self.account;

        let balance = self
            .reader
            .balance(account)
            .await
            .map_err(|source| CoordinatorError::LedgerRead {
                stage: ReadStage::Balance,
                source,
            })?;
        let count = self
            .reader
            .pending_transfer_count(account)
            .await
            .map_err(|source| CoordinatorError::LedgerRead {
                stage: ReadStage::QueueLength,
                source,
            })?;

        let mut scan = TransferScan::new(self.policy, &self.curve, balance.to_ciphertext());
        while !scan.is_full() && scan.next_index() < count {
            let index = scan.next_index();
            let slot = self
                .reader
                .pending_transfer(account, index)
                .await
                .map_err(|source| CoordinatorError::LedgerRead {
                    stage: ReadStage::Transfer { index },
                    source,
                })?;
            if scan.push(slot)? == ScanStep::Full {
                break;
            }
        }
        let outcome = scan.finish();

        let proof_input = ProofInput::assemble(
            &outcome.old_balance,
            &outcome.new_balance,
            &outcome.selected_amounts(),
            self.policy.max_transfers,
        )?;

        Ok(AggregationRun {
            outcome,
            proof_input,
        })
    }

    /// Hand the proof input to the prover.
    ///
    /// With nothing selected under [`EmptyQueuePolicy::Skip`] this returns
    /// `NothingToProcess` and leaves the run `Initialized`.
    pub async fn generate_proof(&mut self) -> Result<&AggregationProof, CoordinatorError> {
        self.expect_state(RunState::Initialized, "generate a proof")?;
        let Some(run) = self.run.as_ref() else {
            return Err(self.invalid_state("generate a proof"));
        };
        if run.outcome.is_empty() && self.empty_queue == EmptyQueuePolicy::Skip {
            return Err(CoordinatorError::NothingToProcess);
        }

        self.state = RunState::ProofRequested;
        let result = self.prover.prove_aggregation(&run.proof_input).await;

        match result {
            Ok(proof) if proof.proof.is_empty() => self.fail(
                ProverError::MalformedArtifact("prover returned an empty proof".into()).into(),
            ),
            Ok(proof) => {
                info!(bytes = proof.proof.len(), "aggregation proof ready");
                self.state = RunState::ProofReady;
                Ok(self.proof.insert(proof))
            }
            Err(e) => self.fail(e.into()),
        }
    }

    /// Submit the proof, selected indexes and new balance in one call.
    ///
    /// Each selected slot is re-read first; if any no longer holds the
    /// transfer that was proven the run fails with `StaleSelection`.
    pub async fn submit(&mut self) -> Result<TxReceipt, CoordinatorError> {
        self.expect_state(RunState::ProofReady, "submit")?;
        let (Some(run), Some(proof)) = (self.run.as_ref(), self.proof.as_ref()) else {
            return Err(self.invalid_state("submit"));
        };

        if let Err(e) = self.recheck_selection(&run.outcome).await {
            return self.fail(e);
        }

        let submission = AggregationSubmission {
            proof: proof.proof.clone(),
            selected_indexes: run.outcome.selected_indexes(),
            fee_recipient: self.fee_recipient,
            account: self.account,
            new_balance: run.outcome.new_balance.to_flat(),
        };

        match self.writer.submit_aggregation(&submission).await {
            Ok(receipt) => {
                info!(
                    tx = %receipt.tx_hash,
                    indexes = ?submission.selected_indexes,
                    "aggregation submitted"
                );
                self.state = RunState::Submitted;
                self.receipt = Some(receipt.clone());
                Ok(receipt)
            }
            Err(LedgerError::StaleIndex { index }) => {
                self.fail(CoordinatorError::StaleSelection { index })
            }
            Err(e) => self.fail(CoordinatorError::Submission(e)),
        }
    }

    async fn recheck_selection(&self, outcome: &ScanOutcome) -> Result<(), CoordinatorError> {
        for selected in &outcome.selected {
            let index = selected.index;
            let slot = self
                .reader
                .pending_transfer(self.account, index)
                .await
                .map_err(|source| CoordinatorError::LedgerRead {
                    stage: ReadStage::Recheck { index },
                    source,
                })?;
            if slot.transfer().map(|t| t.amount) != Some(selected.amount) {
                return Err(CoordinatorError::StaleSelection { index });
            }
        }
        Ok(())
    }

    /// `init`, then `generate_proof` and `submit` unless the empty-queue
    /// policy says to skip.
    pub async fn run(&mut self) -> Result<RunOutcome, CoordinatorError> {
        let scanned = self.init().await?.outcome.scanned;

        if self.is_skippable() {
            info!(account = %self.account, scanned, "no eligible pending transfers, skipping");
            return Ok(RunOutcome::Skipped { scanned });
        }

        self.generate_proof().await?;
        let receipt = self.submit().await?;

        let (selected_indexes, new_balance) = self
            .run
            .as_ref()
            .map(|run| (run.outcome.selected_indexes(), run.outcome.new_balance.to_flat()))
            .unwrap_or_default();

        Ok(RunOutcome::Submitted {
            receipt,
            selected_indexes,
            new_balance,
        })
    }

    fn is_skippable(&self) -> bool {
        self.empty_queue == EmptyQueuePolicy::Skip
            && self.run.as_ref().is_some_and(|run| run.outcome.is_empty())
    }

    fn expect_state(&self, expected: RunState, action: &'static str) -> Result<(), CoordinatorError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_state(action))
        }
    }

    fn invalid_state(&self, action: &'static str) -> CoordinatorError {
        CoordinatorError::InvalidState {
            action,
            state: self.state,
        }
    }

    fn fail<T>(&mut self, error: CoordinatorError) -> Result<T, CoordinatorError> {
        warn!(account = %self.account, %error, "aggregation run abandoned");
        self.state = RunState::Failed;
        Err(error)
    }
}
