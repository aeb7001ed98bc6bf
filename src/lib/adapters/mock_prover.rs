use alloy::primitives::Bytes;
use tokio::sync::Mutex;

use crate::domain::proof_input::ProofInput;
use crate::ports::prover::{Prover, ProverError};
use crate::ports::AggregationProof;

enum Behavior {
    Proof(Bytes),
    Fail(String),
}

/// Canned prover. Records every input it is asked to prove.
pub struct MockProver {
    behavior: Behavior,
    inputs: Mutex<Vec<ProofInput>>,
}

impl MockProver {
    /// Always returns a fixed non-empty proof.
    pub fn new() -> Self {
        Self::with_proof(Bytes::from_static(b"mock-aggregation-proof"))
    }

    pub fn with_proof(proof: Bytes) -> Self {
        Self {
            behavior: Behavior::Proof(proof),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Always fails as if `bb prove` exited non-zero.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Fail(message.into()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub async fn inputs(&self) -> Vec<ProofInput> {
        self.inputs.lock().await.clone()
    }
}

impl Default for MockProver {
    fn default() -> Self {
        Self::new()
    }
}

impl Prover for MockProver {
    async fn prove_aggregation(&self, input: &ProofInput) -> Result<AggregationProof, ProverError> {
        self.inputs.lock().await.push(input.clone());
        match &self.behavior {
            Behavior::Proof(proof) => Ok(AggregationProof::new(proof.clone())),
            Behavior::Fail(message) => Err(ProverError::ProofFailed(message.clone())),
        }
    }
}
