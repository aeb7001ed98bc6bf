use super::ciphertext::Ciphertext;
use crate::ports::curve::{CurveArithmetic, CurveError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    #[error("folding pending transfer {index} failed on {component}: {source}")]
    Fold {
        index: u64,
        component: &'static str,
        #[source]
        source: CurveError,
    },
}

/// Component-wise homomorphic addition: `(a.C1 + b.C1, a.C2 + b.C2)`.
pub fn add_ciphertexts<C: CurveArithmetic>(
    curve: &C,
    a: &Ciphertext,
    b: &Ciphertext,
) -> Result<Ciphertext, (&'static str, CurveError)> {
    let c1 = curve.add_points(&a.c1, &b.c1).map_err(|e| ("C1", e))?;
    let c2 = curve.add_points(&a.c2, &b.c2).map_err(|e| ("C2", e))?;
    Ok(Ciphertext::new(c1, c2))
}

/// Running encrypted balance, seeded with the account's on-chain balance.
///
/// Transfers must be folded in queue-index order so that the resulting
/// coordinates (and any proof over them) are reproducible.
#[derive(Debug, Clone)]
pub struct BalanceAccumulator<C> {
    curve: C,
    balance: Ciphertext,
    folded: Vec<u64>,
}

impl<C: CurveArithmetic> BalanceAccumulator<C> {
    pub fn new(curve: C, current: Ciphertext) -> Self {
        Self {
            curve,
            balance: current,
            folded: Vec::new(),
        }
    }

    /// Add the transfer at queue `index` into the running balance.
    pub fn fold(&mut self, index: u64, amount: &Ciphertext) -> Result<(), AggregationError> {
        self.balance = add_ciphertexts(&self.curve, &self.balance, amount).map_err(
            |(component, source)| AggregationError::Fold {
                index,
                component,
                source,
            },
        )?;
        self.folded.push(index);
        Ok(())
    }

    pub fn balance(&self) -> &Ciphertext {
        &self.balance
    }

    /// Queue indexes folded so far, in fold order.
    pub fn folded(&self) -> &[u64] {
        &self.folded
    }

    pub fn into_parts(self) -> (Ciphertext, Vec<u64>) {
        (self.balance, self.folded)
    }
}

/// Fold `transfers` (queue index, amount) into `current`.
pub fn fold_balance<'a, C, I>(
    curve: &C,
    current: Ciphertext,
    transfers: I,
) -> Result<Ciphertext, AggregationError>
where
    C: CurveArithmetic,
    I: IntoIterator<Item = (u64, &'a Ciphertext)>,
{
    let mut acc = BalanceAccumulator::new(curve, current);
    for (index, amount) in transfers {
        acc.fold(index, amount)?;
    }
    Ok(acc.into_parts().0)
}

#[cfg(test)]
pub(crate) mod test_curve {
    use alloy::primitives::U256;

    use crate::domain::ciphertext::Point;
    use crate::ports::curve::{CurveArithmetic, CurveError};

    /// Additive group on pairs of integers. Rejects `x == U256::MAX` so error
    /// paths can be exercised.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct IntegerCurve;

    impl CurveArithmetic for IntegerCurve {
        fn add_points(&self, a: &Point, b: &Point) -> Result<Point, CurveError> {
            if a.x == U256::MAX || b.x == U256::MAX {
                return Err(CurveError::NotOnCurve {
                    x: U256::MAX.to_string(),
                    y: "?".into(),
                });
            }
            Ok(Point::new(
                a.x.wrapping_add(b.x),
                a.y.wrapping_add(b.y),
            ))
        }
    }

    pub fn ct(c1x: u64, c1y: u64, c2x: u64, c2y: u64) -> crate::domain::ciphertext::Ciphertext {
        crate::domain::ciphertext::Ciphertext::new(
            Point::new(U256::from(c1x), U256::from(c1y)),
            Point::new(U256::from(c2x), U256::from(c2y)),
        )
    }
}
