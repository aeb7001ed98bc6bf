pub mod bb_prover;
pub mod ethereum;
pub mod mock_ledger;
pub mod mock_prover;
