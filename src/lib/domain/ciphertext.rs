use alloy::primitives::{B256, U256};
use serde::Serialize;

/// Hex literal the prover's parser expects in unused `encrypted_values` slots.
///
/// Real coordinates are always written as full 32-byte words; only padding
/// uses the bare form.
pub const PADDING_WORD: &str = "0x0";

/// A curve point as stored on-chain: two field elements held as `uint256`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: U256,
    pub y: U256,
}

impl Point {
    /// Literal `(0, 0)`. Not a curve point; marks unwritten storage.
    pub const ZERO: Self = Self::new(U256::ZERO, U256::ZERO);

    pub const fn new(x: U256, y: U256) -> Self {
        Self { x, y }
    }

    pub fn is_zero(&self) -> bool {
        self.x.is_zero() && self.y.is_zero()
    }
}

/// An ElGamal ciphertext `(C1, C2)` in computation form.
///
/// Used for both account balances and pending transfer amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ciphertext {
    pub c1: Point,
    pub c2: Point,
}

impl Ciphertext {
    /// All four coordinates zero: a deleted or never-populated slot.
    pub const ZERO: Self = Self::new(Point::ZERO, Point::ZERO);

    pub const fn new(c1: Point, c2: Point) -> Self {
        Self { c1, c2 }
    }

    /// True iff every coordinate is the literal integer zero.
    pub fn is_zero(&self) -> bool {
        self.c1.is_zero() && self.c2.is_zero()
    }

    pub fn to_flat(&self) -> FlatCiphertext {
        FlatCiphertext::from(*self)
    }
}

/// On-chain encoding of a ciphertext: `[C1x, C1y, C2x, C2y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FlatCiphertext(pub [U256; 4]);

impl FlatCiphertext {
    pub const fn new(c1x: U256, c1y: U256, c2x: U256, c2y: U256) -> Self {
        Self([c1x, c1y, c2x, c2y])
    }

    pub fn c1x(&self) -> U256 {
        self.0[0]
    }

    pub fn c1y(&self) -> U256 {
        self.0[1]
    }

    pub fn c2x(&self) -> U256 {
        self.0[2]
    }

    pub fn c2y(&self) -> U256 {
        self.0[3]
    }

    pub fn to_ciphertext(&self) -> Ciphertext {
        Ciphertext::from(*self)
    }
}

impl From<FlatCiphertext> for Ciphertext {
    fn from(flat: FlatCiphertext) -> Self {
        let [c1x, c1y, c2x, c2y] = flat.0;
        Self::new(Point::new(c1x, c1y), Point::new(c2x, c2y))
    }
}

impl From<Ciphertext> for FlatCiphertext {
    fn from(ct: Ciphertext) -> Self {
        Self::new(ct.c1.x, ct.c1.y, ct.c2.x, ct.c2.y)
    }
}

impl From<[U256; 4]> for FlatCiphertext {
    fn from(words: [U256; 4]) -> Self {
        Self(words)
    }
}

/// A point as the Noir prover reads it: `{ x = "0x…", y = "0x…" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HexPoint {
    pub x: String,
    pub y: String,
}

impl HexPoint {
    /// Filler entry for an unused transfer slot.
    pub fn padding() -> Self {
        Self {
            x: PADDING_WORD.to_string(),
            y: PADDING_WORD.to_string(),
        }
    }

    pub fn is_padding(&self) -> bool {
        self.x == PADDING_WORD && self.y == PADDING_WORD
    }
}

impl From<&Point> for HexPoint {
    fn from(point: &Point) -> Self {
        Self {
            x: format_word(point.x),
            y: format_word(point.y),
        }
    }
}

impl From<Point> for HexPoint {
    fn from(point: Point) -> Self {
        Self::from(&point)
    }
}

/// Format a field element as a zero-padded 32-byte big-endian hex word.
pub fn format_word(value: U256) -> String {
    format!("{:#x}", B256::from(value))
}
