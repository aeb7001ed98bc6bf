pub mod curve;
pub mod ledger;
pub mod prover;

use alloy::primitives::{B256, Bytes};

/// Proof artifact for the `process_pending_transfers` circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationProof {
    /// Serialized proof in Barretenberg format
    pub proof: Bytes,
}

impl AggregationProof {
    pub fn new(proof: Bytes) -> Self {
        Self { proof }
    }
}

/// Minimal transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub success: bool,
}
