use crate::domain::ciphertext::Point;

/// Port for the elliptic-curve group the ElGamal scheme lives in.
///
/// Aggregation only ever adds points, so that is all this port exposes.
///
/// Implementations:
/// - `BabyJubJub` (arkworks, twisted Edwards form used by the Noir circuits)
/// - test doubles with integer arithmetic
pub trait CurveArithmetic: Send + Sync {
    /// Group addition `a + b`.
    fn add_points(&self, a: &Point, b: &Point) -> Result<Point, CurveError>;
}

impl<T: CurveArithmetic + ?Sized> CurveArithmetic for &T {
    fn add_points(&self, a: &Point, b: &Point) -> Result<Point, CurveError> {
        (**self).add_points(a, b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CurveError {
    #[error("coordinate is not a canonical field element: {0}")]
    NotInField(String),

    #[error("point ({x}, {y}) is not on the curve")]
    NotOnCurve { x: String, y: String },

    #[error("invalid packed point: {0}")]
    InvalidEncoding(String),
}
