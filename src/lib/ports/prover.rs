use std::future::Future;
use std::sync::Arc;

use super::AggregationProof;
use crate::domain::proof_input::ProofInput;

/// Port for ZK proof generation.
///
/// Implementations:
/// - `BBProver` (shells out to `nargo execute` + `bb prove`)
/// - `MockProver` for testing
pub trait Prover: Send + Sync {
    /// Prove that `balance_new` is `balance_old` plus the transfers encoded
    /// in `input.encrypted_values`.
    fn prove_aggregation(
        &self,
        input: &ProofInput,
    ) -> impl Future<Output = Result<AggregationProof, ProverError>> + Send;
}

impl<T: Prover + ?Sized> Prover for Arc<T> {
    fn prove_aggregation(
        &self,
        input: &ProofInput,
    ) -> impl Future<Output = Result<AggregationProof, ProverError>> + Send {
        (**self).prove_aggregation(input)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProverError {
    #[error("proof generation failed: {0}")]
    ProofFailed(String),

    #[error("witness generation failed: {0}")]
    WitnessError(String),

    #[error("prover input serialization error: {0}")]
    Serialization(String),

    #[error("prover binary not found: {0}")]
    BinaryNotFound(String),

    #[error("malformed proof artifact: {0}")]
    MalformedArtifact(String),

    #[error("proof generation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
