pub mod babyjubjub;
pub mod elgamal;
