use std::collections::HashMap;

use alloy::primitives::B256;
use ark_ec::{CurveGroup, PrimeGroup};
use ark_ff::{BigInteger, PrimeField, Zero};
use ark_std::rand::Rng;
use ark_std::UniformRand;

use super::babyjubjub::{
    affine_to_point, pack_point, point_to_affine, unpack_point, BabyJubJubAffine,
    BabyJubJubProjective, Fr,
};
use crate::domain::ciphertext::{Ciphertext, Point};
use crate::ports::curve::CurveError;

/// Default plaintext search range for [`decrypt`]: amounts below `2^32`.
pub const DEFAULT_DECRYPT_BOUND: u64 = 1 << 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ElGamalError {
    #[error(transparent)]
    Curve(#[from] CurveError),

    #[error("plaintext is not in [0, {bound})")]
    OutOfRange { bound: u64 },
}

/// BabyJubJub secret scalar.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Fr);

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

impl SecretKey {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(Fr::rand(rng))
    }

    /// Big-endian bytes, reduced mod the subgroup order.
    pub fn from_b256(value: B256) -> Self {
        Self(Fr::from_be_bytes_mod_order(value.as_ref()))
    }

    pub fn to_b256(&self) -> B256 {
        B256::from_slice(&self.0.into_bigint().to_bytes_be())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey((BabyJubJubProjective::generator() * self.0).into_affine())
    }
}

/// `sk·G`. The packed form doubles as the on-chain account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(BabyJubJubAffine);

impl PublicKey {
    pub fn from_point(point: &Point) -> Result<Self, CurveError> {
        point_to_affine(point).map(Self)
    }

    pub fn point(&self) -> Point {
        affine_to_point(&self.0)
    }

    pub fn pack(&self) -> B256 {
        pack_point(&self.0)
    }

    pub fn unpack(packed: B256) -> Result<Self, CurveError> {
        unpack_point(packed).map(Self)
    }
}

/// Exponential ElGamal: `C1 = r·G`, `C2 = m·G + r·PK`.
pub fn encrypt<R: Rng + ?Sized>(pk: &PublicKey, amount: u64, rng: &mut R) -> Ciphertext {
    encrypt_with_randomness(pk, amount, Fr::rand(rng))
}

pub fn encrypt_with_randomness(pk: &PublicKey, amount: u64, r: Fr) -> Ciphertext {
    let g = BabyJubJubProjective::generator();
    let c1 = (g * r).into_affine();
    let c2 = (g * Fr::from(amount) + BabyJubJubProjective::from(pk.0) * r).into_affine();
    Ciphertext::new(affine_to_point(&c1), affine_to_point(&c2))
}

/// `C2 - sk·C1`, the plaintext embedded as `m·G`.
pub fn decrypt_embedded(sk: &SecretKey, ct: &Ciphertext) -> Result<BabyJubJubAffine, ElGamalError> {
    let c1 = BabyJubJubProjective::from(point_to_affine(&ct.c1)?);
    let c2 = BabyJubJubProjective::from(point_to_affine(&ct.c2)?);
    Ok((c2 - c1 * sk.0).into_affine())
}

/// Recover `m` from `ct`, searching `[0, table.bound())`.
pub fn decrypt(
    sk: &SecretKey,
    ct: &Ciphertext,
    table: &DiscreteLogTable,
) -> Result<u64, ElGamalError> {
    let embedded = decrypt_embedded(sk, ct)?;
    table.solve(&embedded).ok_or(ElGamalError::OutOfRange {
        bound: table.bound(),
    })
}

/// Baby-step giant-step table for discrete logs base `G`.
///
/// Holds `ceil(sqrt(bound))` baby steps; build once and reuse across
/// decryptions.
pub struct DiscreteLogTable {
    bound: u64,
    step: u64,
    baby_steps: HashMap<Point, u64>,
    giant_stride: BabyJubJubProjective,
}

impl DiscreteLogTable {
    pub fn new(bound: u64) -> Self {
        let bound = bound.max(1);
        let mut step = bound.isqrt();
        if step * step < bound {
            step += 1;
        }

        let g = BabyJubJubProjective::generator();
        let mut baby_steps = HashMap::with_capacity(step as usize);
        let mut acc = BabyJubJubProjective::zero();
        for j in 0..step {
            baby_steps.entry(affine_to_point(&acc.into_affine())).or_insert(j);
            acc += g;
        }

        Self {
            bound,
            step,
            baby_steps,
            giant_stride: -acc,
        }
    }

    pub fn bound(&self) -> u64 {
        self.bound
    }

    /// Smallest `m < bound` with `m·G == target`.
    pub fn solve(&self, target: &BabyJubJubAffine) -> Option<u64> {
        let mut gamma = BabyJubJubProjective::from(*target);
        for i in 0..=self.bound / self.step {
            if let Some(j) = self.baby_steps.get(&affine_to_point(&gamma.into_affine())) {
                let m = i * self.step + j;
                return (m < self.bound).then_some(m);
            }
            gamma += self.giant_stride;
        }
        None
    }
}

impl Default for DiscreteLogTable {
    fn default() -> Self {
        Self::new(DEFAULT_DECRYPT_BOUND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::babyjubjub::BabyJubJub;
    use crate::domain::aggregation::add_ciphertexts;

    fn small_table() -> DiscreteLogTable {
        DiscreteLogTable::new(1 << 16)
    }

    #[test]
    fn test_encrypt_decrypt() {
        let mut rng = ark_std::test_rng();
        let sk = SecretKey::random(&mut rng);
        let table = small_table();

        for amount in [0u64, 1, 42, 1000, 65_535] {
            let ct = encrypt(&sk.public_key(), amount, &mut rng);
            assert_eq!(decrypt(&sk, &ct, &table).unwrap(), amount);
        }
    }

    #[test]
    fn test_zero_ciphertext_decrypts_to_zero() {
        let mut rng = ark_std::test_rng();
        let sk = SecretKey::random(&mut rng);
        assert_eq!(decrypt(&sk, &Ciphertext::ZERO, &small_table()).unwrap(), 0);
    }

    #[test]
    fn test_sum_of_ciphertexts_decrypts_to_sum() {
        let mut rng = ark_std::test_rng();
        let sk = SecretKey::random(&mut rng);
        let pk = sk.public_key();

        let a = encrypt(&pk, 300, &mut rng);
        let b = encrypt(&pk, 45, &mut rng);
        let sum = add_ciphertexts(&BabyJubJub, &a, &b).unwrap();

        assert_eq!(decrypt(&sk, &sum, &small_table()).unwrap(), 345);
    }

    #[test]
    fn test_wrong_key_does_not_decrypt() {
        let mut rng = ark_std::test_rng();
        let sk = SecretKey::random(&mut rng);
        let other = SecretKey::random(&mut rng);
        let ct = encrypt(&sk.public_key(), 7, &mut rng);

        assert_ne!(decrypt(&other, &ct, &small_table()), Ok(7));
    }

    #[test]
    fn test_out_of_range_amount() {
        let mut rng = ark_std::test_rng();
        let sk = SecretKey::random(&mut rng);
        let ct = encrypt(&sk.public_key(), 5000, &mut rng);

        let err = decrypt(&sk, &ct, &DiscreteLogTable::new(100)).unwrap_err();
        assert_eq!(err, ElGamalError::OutOfRange { bound: 100 });
    }

    #[test]
    fn test_encryption_is_randomized() {
        let mut rng = ark_std::test_rng();
        let pk = SecretKey::random(&mut rng).public_key();
        assert_ne!(encrypt(&pk, 9, &mut rng), encrypt(&pk, 9, &mut rng));
    }

    #[test]
    fn test_public_key_pack_roundtrip() {
        let mut rng = ark_std::test_rng();
        let pk = SecretKey::random(&mut rng).public_key();
        assert_eq!(PublicKey::unpack(pk.pack()).unwrap(), pk);
    }

    #[test]
    fn test_secret_key_b256_roundtrip() {
        let mut rng = ark_std::test_rng();
        let sk = SecretKey::random(&mut rng);
        let restored = SecretKey::from_b256(sk.to_b256());
        assert_eq!(restored.public_key(), sk.public_key());
    }
}
