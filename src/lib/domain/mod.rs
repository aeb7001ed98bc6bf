pub mod aggregation;
pub mod ciphertext;
pub mod proof_input;
pub mod selection;
pub mod transfer;
