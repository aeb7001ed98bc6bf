use super::ciphertext::{Ciphertext, HexPoint};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofInputError {
    #[error("{selected} transfers selected but the circuit takes at most {max}")]
    TooManyTransfers { selected: usize, max: usize },
}

/// Fixed-shape input of the `process_pending_transfers` circuit.
///
/// `encrypted_values` always holds exactly `2 * max_transfers` points: the
/// selected transfers as `C1, C2` pairs in selection order, then padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofInput {
    pub balance_old: [HexPoint; 2],
    pub balance_new: [HexPoint; 2],
    pub encrypted_values: Vec<HexPoint>,
}

impl ProofInput {
    pub fn assemble(
        old_balance: &Ciphertext,
        new_balance: &Ciphertext,
        selected: &[Ciphertext],
        max_transfers: usize,
    ) -> Result<Self, ProofInputError> {
        if selected.len() > max_transfers {
            return Err(ProofInputError::TooManyTransfers {
                selected: selected.len(),
                max: max_transfers,
            });
        }

        let mut encrypted_values = Vec::with_capacity(2 * max_transfers);
        for amount in selected {
            encrypted_values.push(HexPoint::from(&amount.c1));
            encrypted_values.push(HexPoint::from(&amount.c2));
        }
        for _ in selected.len()..max_transfers {
            encrypted_values.push(HexPoint::padding());
            encrypted_values.push(HexPoint::padding());
        }

        Ok(Self {
            balance_old: hex_pair(old_balance),
            balance_new: hex_pair(new_balance),
            encrypted_values,
        })
    }

    /// Number of real (non-padding) transfers encoded.
    pub fn transfer_count(&self) -> usize {
        self.encrypted_values
            .chunks(2)
            .take_while(|pair| !pair.iter().all(HexPoint::is_padding))
            .count()
    }
}

fn hex_pair(ct: &Ciphertext) -> [HexPoint; 2] {
    [HexPoint::from(&ct.c1), HexPoint::from(&ct.c2)]
}
