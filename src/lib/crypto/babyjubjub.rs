use alloy::primitives::{B256, U256};
use ark_ec::twisted_edwards::{Affine, MontCurveConfig, Projective, TECurveConfig};
use ark_ec::{CurveConfig, CurveGroup};
use ark_ff::{BigInt, BigInteger, Field, MontFp, One, PrimeField, Zero};

use crate::domain::ciphertext::Point;
use crate::ports::curve::{CurveArithmetic, CurveError};

/// Base field: the BN254 scalar field, so coordinates are native Noir fields.
pub type Fq = ark_bn254::Fr;
/// Prime-order subgroup scalar field.
pub type Fr = ark_ed_on_bn254::Fr;

pub type BabyJubJubAffine = Affine<BabyJubJubConfig>;
pub type BabyJubJubProjective = Projective<BabyJubJubConfig>;

/// BabyJubJub in the form used by circomlib and the Noir circuits:
/// `168700·x² + y² = 1 + 168696·x²·y²`.
///
/// `ark-ed-on-bn254` implements the same group under a different
/// (`a = 1`) parametrization, so its coordinates would not match on-chain
/// values. Only the cofactor inverse is shared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BabyJubJubConfig;

impl CurveConfig for BabyJubJubConfig {
    type BaseField = Fq;
    type ScalarField = Fr;

    const COFACTOR: &'static [u64] = &[8];
    const COFACTOR_INV: Fr = <ark_ed_on_bn254::EdwardsConfig as CurveConfig>::COFACTOR_INV;
}

impl TECurveConfig for BabyJubJubConfig {
    const COEFF_A: Fq = MontFp!("168700");
    const COEFF_D: Fq = MontFp!("168696");

    /// `Base8`, generator of the prime-order subgroup.
    const GENERATOR: BabyJubJubAffine = BabyJubJubAffine::new_unchecked(BASE8_X, BASE8_Y);

    type MontCurveConfig = BabyJubJubConfig;
}

impl MontCurveConfig for BabyJubJubConfig {
    const COEFF_A: Fq = MontFp!("168698");
    const COEFF_B: Fq = MontFp!("1");

    type TECurveConfig = BabyJubJubConfig;
}

const BASE8_X: Fq =
    MontFp!("5299619240641551281634865583518297030282874472190772894086521144482721001553");
const BASE8_Y: Fq =
    MontFp!("16950150798460657717958625567821834550301663161624707787222815936182638968203");

// ── Conversion helpers (U256 ↔ field, Point ↔ affine) ──

/// Interpret `value` as a canonical base field element.
pub fn u256_to_fq(value: U256) -> Result<Fq, CurveError> {
    Fq::from_bigint(BigInt::new(*value.as_limbs()))
        .ok_or_else(|| CurveError::NotInField(value.to_string()))
}

pub fn fq_to_u256(value: Fq) -> U256 {
    U256::from_limbs(value.into_bigint().0)
}

/// Group identity `(0, 1)`.
pub fn identity() -> BabyJubJubAffine {
    BabyJubJubAffine::new_unchecked(Fq::zero(), Fq::one())
}

/// Lift an on-chain point onto the curve.
///
/// `(0, 0)` is what the ledger returns for a balance that was never written
/// and is read as the identity.
pub fn point_to_affine(point: &Point) -> Result<BabyJubJubAffine, CurveError> {
    if point.is_zero() {
        return Ok(identity());
    }

    let affine = BabyJubJubAffine::new_unchecked(u256_to_fq(point.x)?, u256_to_fq(point.y)?);
    if !affine.is_on_curve() {
        return Err(CurveError::NotOnCurve {
            x: point.x.to_string(),
            y: point.y.to_string(),
        });
    }
    Ok(affine)
}

pub fn affine_to_point(affine: &BabyJubJubAffine) -> Point {
    Point::new(fq_to_u256(affine.x), fq_to_u256(affine.y))
}

// ── Point compression (circomlib format) ──

/// `x` is "negative" when it lies in the upper half of the field.
fn is_negative(x: Fq) -> bool {
    x.into_bigint() > Fq::MODULUS_MINUS_ONE_DIV_TWO
}

/// Compress to 32 bytes: little-endian `y` with the sign of `x` in the top bit.
pub fn pack_point(point: &BabyJubJubAffine) -> B256 {
    let mut bytes = point.y.into_bigint().to_bytes_le();
    if is_negative(point.x) {
        bytes[31] |= 0x80;
    }
    B256::from_slice(&bytes)
}

/// Inverse of [`pack_point`]. Recovers `x` from the curve equation.
pub fn unpack_point(packed: B256) -> Result<BabyJubJubAffine, CurveError> {
    let mut bytes = packed.0;
    let sign = bytes[31] & 0x80 != 0;
    bytes[31] &= 0x7f;

    let y = u256_to_fq(U256::from_le_bytes(bytes))
        .map_err(|_| CurveError::InvalidEncoding(format!("{packed}: y is not a field element")))?;

    // x² = (1 - y²) / (a - d·y²)
    let y2 = y.square();
    let numerator = Fq::one() - y2;
    let denominator = <BabyJubJubConfig as TECurveConfig>::COEFF_A
        - <BabyJubJubConfig as TECurveConfig>::COEFF_D * y2;
    let inverse = denominator
        .inverse()
        .ok_or_else(|| CurveError::InvalidEncoding(format!("{packed}: degenerate y")))?;
    let mut x = (numerator * inverse)
        .sqrt()
        .ok_or_else(|| CurveError::InvalidEncoding(format!("{packed}: no x for y")))?;

    if is_negative(x) != sign {
        x = -x;
    }

    let point = BabyJubJubAffine::new_unchecked(x, y);
    if !point.is_on_curve() {
        return Err(CurveError::InvalidEncoding(format!("{packed}: not on curve")));
    }
    Ok(point)
}

/// arkworks-backed [`CurveArithmetic`] over BabyJubJub.
#[derive(Debug, Clone, Copy, Default)]
pub struct BabyJubJub;

impl CurveArithmetic for BabyJubJub {
    fn add_points(&self, a: &Point, b: &Point) -> Result<Point, CurveError> {
        let a = BabyJubJubProjective::from(point_to_affine(a)?);
        let b = BabyJubJubProjective::from(point_to_affine(b)?);
        Ok(affine_to_point(&(a + b).into_affine()))
    }
}
