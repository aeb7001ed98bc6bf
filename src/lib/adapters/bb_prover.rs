use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::Bytes;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::ciphertext::HexPoint;
use crate::domain::proof_input::ProofInput;
use crate::ports::prover::{Prover, ProverError};
use crate::ports::AggregationProof;

/// Default circuit directory name under `circuits_dir`.
pub const DEFAULT_CIRCUIT_NAME: &str = "process_pending_transfers";

/// TOML-serializable input for the pending-transfer circuit.
///
/// Field names **must** match the Noir circuit parameter names exactly.
#[derive(Serialize)]
struct AggregationProverInput<'a> {
    balance_old_to_encrypted_1: &'a HexPoint,
    balance_old_to_encrypted_2: &'a HexPoint,
    balance_new_to_encrypted_1: &'a HexPoint,
    balance_new_to_encrypted_2: &'a HexPoint,
    encrypted_values: &'a [HexPoint],
}

impl<'a> From<&'a ProofInput> for AggregationProverInput<'a> {
    fn from(input: &'a ProofInput) -> Self {
        let [old_1, old_2] = &input.balance_old;
        let [new_1, new_2] = &input.balance_new;
        Self {
            balance_old_to_encrypted_1: old_1,
            balance_old_to_encrypted_2: old_2,
            balance_new_to_encrypted_1: new_1,
            balance_new_to_encrypted_2: new_2,
            encrypted_values: &input.encrypted_values,
        }
    }
}

/// Render `input` as the circuit's `Prover.toml`.
pub fn format_prover_toml(input: &ProofInput) -> Result<String, ProverError> {
    toml::to_string(&AggregationProverInput::from(input))
        .map_err(|e| ProverError::Serialization(e.to_string()))
}

/// BBProver generates ZK proofs by shelling out to nargo and bb (Barretenberg CLI).
///
/// This prover:
/// 1. Writes the proof input to Prover.toml in the circuit directory
/// 2. Runs `nargo execute` to generate the witness
/// 3. Runs `bb prove` to generate the proof
/// 4. Reads the proof bytes from `target/proof`
///
/// With a timeout set, the subprocess still running when it expires is killed.
pub struct BBProver {
    /// Path to the circuits directory (containing `<circuit_name>/`)
    circuits_dir: PathBuf,
    circuit_name: String,
    nargo: PathBuf,
    bb: PathBuf,
    timeout: Option<Duration>,
}

impl BBProver {
    pub fn new(circuits_dir: PathBuf, circuit_name: impl Into<String>) -> Self {
        Self {
            circuits_dir,
            circuit_name: circuit_name.into(),
            nargo: PathBuf::from("nargo"),
            bb: PathBuf::from("bb"),
            timeout: None,
        }
    }

    /// Use these executables instead of `nargo` and `bb` from `PATH`.
    pub fn with_binaries(mut self, nargo: impl Into<PathBuf>, bb: impl Into<PathBuf>) -> Self {
        self.nargo = nargo.into();
        self.bb = bb.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn circuit_dir(&self) -> PathBuf {
        self.circuits_dir.join(&self.circuit_name)
    }

    /// Execute the circuit and generate a proof.
    async fn prove_circuit(&self, prover_toml: &str) -> Result<Vec<u8>, ProverError> {
        let circuit_dir = self.circuit_dir();
        let circuit_name = self.circuit_name.as_str();

        if !circuit_dir.exists() {
            return Err(ProverError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Circuit directory not found: {}", circuit_dir.display()),
            )));
        }

        // 1. Write Prover.toml
        std::fs::write(circuit_dir.join("Prover.toml"), prover_toml)?;
        debug!(dir = %circuit_dir.display(), "wrote Prover.toml");

        // 2. Run nargo execute to generate witness
        let nargo = Command::new(&self.nargo)
            .args(["execute", "witness"])
            .current_dir(&circuit_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| binary_error(&self.nargo, e))?;

        if !nargo.status.success() {
            let stderr = String::from_utf8_lossy(&nargo.stderr);
            return Err(ProverError::WitnessError(format!(
                "nargo execute failed: {stderr}"
            )));
        }

        // 3. Run bb prove
        let bb = Command::new(&self.bb)
            .args([
                "prove",
                "-b",
                &format!("target/{circuit_name}.json"),
                "-w",
                "target/witness.gz",
                "--write_vk",
                "--oracle_hash",
                "keccak",
                "-o",
                "target/",
            ])
            .current_dir(&circuit_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| binary_error(&self.bb, e))?;

        if !bb.status.success() {
            let stderr = String::from_utf8_lossy(&bb.stderr);
            return Err(ProverError::ProofFailed(format!("bb prove failed: {stderr}")));
        }

        // 4. Read proof file
        let proof = std::fs::read(circuit_dir.join("target").join("proof"))?;
        if proof.is_empty() {
            return Err(ProverError::MalformedArtifact(
                "bb prove wrote an empty proof".into(),
            ));
        }

        Ok(proof)
    }
}

fn binary_error(binary: &Path, err: std::io::Error) -> ProverError {
    if err.kind() == std::io::ErrorKind::NotFound {
        ProverError::BinaryNotFound(binary.display().to_string())
    } else {
        ProverError::IoError(err)
    }
}

impl Prover for BBProver {
    async fn prove_aggregation(&self, input: &ProofInput) -> Result<AggregationProof, ProverError> {
        let prover_toml = format_prover_toml(input)?;
        info!(
            circuit = %self.circuit_name,
            transfers = input.transfer_count(),
            "generating aggregation proof"
        );
        let proof_bytes = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.prove_circuit(&prover_toml))
                .await
                .map_err(|_| ProverError::Timeout(limit))??,
            None => self.prove_circuit(&prover_toml).await?,
        };
        info!(bytes = proof_bytes.len(), "proof generated");
        Ok(AggregationProof::new(Bytes::from(proof_bytes)))
    }
}
