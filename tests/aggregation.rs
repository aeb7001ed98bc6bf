//! End-to-end aggregation over real BabyJubJub ciphertexts with the in-memory
//! ledger and canned prover.

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use ark_std::rand::rngs::StdRng;
use ark_std::rand::SeedableRng;

use jubjub_aggregator::adapters::bb_prover::format_prover_toml;
use jubjub_aggregator::adapters::mock_ledger::MockLedger;
use jubjub_aggregator::adapters::mock_prover::MockProver;
use jubjub_aggregator::coordinator::{
    CoordinatorError, ProcessTransferCoordinator, RunOutcome, RunState,
};
use jubjub_aggregator::crypto::babyjubjub::BabyJubJub;
use jubjub_aggregator::crypto::elgamal::{decrypt, encrypt, DiscreteLogTable, SecretKey};
use jubjub_aggregator::domain::ciphertext::{Ciphertext, HexPoint, PADDING_WORD};
use jubjub_aggregator::domain::selection::SelectionPolicy;
use jubjub_aggregator::ports::ledger::LedgerReader;
use jubjub_aggregator::ports::prover::ProverError;

type Coordinator =
    ProcessTransferCoordinator<Arc<MockLedger>, Arc<MockLedger>, Arc<MockProver>, BabyJubJub>;

struct Fixture {
    sk: SecretKey,
    account: B256,
    ledger: Arc<MockLedger>,
    prover: Arc<MockProver>,
    table: DiscreteLogTable,
    rng: StdRng,
}

impl Fixture {
    fn new() -> Self {
        Self::with_prover(MockProver::new())
    }

    fn with_prover(prover: MockProver) -> Self {
        let mut rng = StdRng::seed_from_u64(7);
        let sk = SecretKey::random(&mut rng);
        let account = sk.public_key().pack();
        Self {
            sk,
            account,
            ledger: Arc::new(MockLedger::new()),
            prover: Arc::new(prover),
            table: DiscreteLogTable::new(1 << 16),
            rng,
        }
    }

    fn encrypt(&mut self, amount: u64) -> Ciphertext {
        encrypt(&self.sk.public_key(), amount, &mut self.rng)
    }

    async fn set_balance(&mut self, amount: u64) {
        let ct = self.encrypt(amount);
        self.ledger.set_balance(self.account, ct).await;
    }

    async fn push(&mut self, amount: u64, fee: u64) -> u64 {
        let ct = self.encrypt(amount);
        self.ledger
            .push_transfer(self.account, ct, U256::from(fee))
            .await
    }

    fn coordinator(&self, max_transfers: usize, min_fee: u64) -> Coordinator {
        ProcessTransferCoordinator::new(
            self.ledger.clone(),
            self.ledger.clone(),
            self.prover.clone(),
            BabyJubJub,
            self.account,
            Address::repeat_byte(0x11),
        )
        .with_policy(SelectionPolicy::new(max_transfers, U256::from(min_fee)))
    }

    fn decrypt(&self, ct: &Ciphertext) -> u64 {
        decrypt(&self.sk, ct, &self.table).unwrap()
    }

    async fn onchain_balance(&self) -> u64 {
        let flat = self.ledger.balance(self.account).await.unwrap();
        self.decrypt(&flat.to_ciphertext())
    }
}

#[tokio::test]
async fn test_empty_queue_keeps_balance_and_pads_input() {
    let mut fx = Fixture::new();
    fx.set_balance(50).await;

    let mut coordinator = fx.coordinator(4, 0);
    let run = coordinator.init().await.unwrap();

    assert!(run.outcome.selected.is_empty());
    assert_eq!(run.outcome.new_balance, run.outcome.old_balance);
    assert_eq!(run.proof_input.encrypted_values.len(), 8);
    assert!(run.proof_input.encrypted_values.iter().all(HexPoint::is_padding));
    assert_eq!(fx.decrypt(&run.outcome.new_balance), 50);
}

#[tokio::test]
async fn test_stops_at_max_and_proves_homomorphic_sum() {
    let mut fx = Fixture::new();
    fx.set_balance(100).await;
    fx.push(20, 3).await;
    fx.push(30, 3).await;
    fx.push(45, 3).await;

    let mut coordinator = fx.coordinator(2, 0);
    let run = coordinator.init().await.unwrap();

    assert_eq!(run.outcome.selected_indexes(), vec![0, 1]);
    assert_eq!(fx.decrypt(&run.outcome.new_balance), 150);

    let values = &run.proof_input.encrypted_values;
    assert_eq!(values.len(), 4);
    assert!(values.iter().all(|p| !p.is_padding()));
    assert_eq!(values[0], HexPoint::from(&run.outcome.selected[0].amount.c1));
    assert_eq!(values[3], HexPoint::from(&run.outcome.selected[1].amount.c2));
    assert!(values.iter().all(|p| p.x.len() == 66 && p.y.len() == 66));

    let outcome = coordinator.run().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Submitted { ref selected_indexes, .. } if *selected_indexes == vec![0, 1]));
    assert_eq!(fx.onchain_balance().await, 150);

    // Second run picks up the transfer left behind.
    let mut coordinator = fx.coordinator(2, 0);
    coordinator.run().await.unwrap();
    assert_eq!(fx.onchain_balance().await, 195);
}

#[tokio::test]
async fn test_deleted_slot_is_skipped() {
    let mut fx = Fixture::new();
    fx.set_balance(5).await;
    let index = fx.push(9, 1).await;
    fx.ledger.clear_transfer(fx.account, index).await;

    let mut coordinator = fx.coordinator(4, 0);
    let run = coordinator.init().await.unwrap();

    assert!(run.outcome.selected.is_empty());
    assert_eq!(run.outcome.skipped_empty, vec![0]);
    assert_eq!(run.outcome.scanned, 1);
    assert_eq!(fx.decrypt(&run.outcome.new_balance), 5);
}

#[tokio::test]
async fn test_low_fee_transfer_is_folded_not_selected() {
    let mut fx = Fixture::new();
    fx.set_balance(10).await;
    fx.push(4, 1).await;
    fx.push(6, 50).await;

    let mut coordinator = fx.coordinator(4, 1);
    let run = coordinator.init().await.unwrap();

    assert_eq!(run.outcome.selected_indexes(), vec![1]);
    assert_eq!(run.outcome.folded, vec![0, 1]);
    assert_eq!(fx.decrypt(&run.outcome.new_balance), 20);
    assert_eq!(run.proof_input.transfer_count(), 1);
}

#[tokio::test]
async fn test_unwritten_balance_folds_from_zero() {
    let mut fx = Fixture::new();
    fx.push(12, 1).await;

    let mut coordinator = fx.coordinator(4, 0);
    coordinator.run().await.unwrap();

    assert_eq!(fx.onchain_balance().await, 12);
}

#[tokio::test]
async fn test_prover_receives_circuit_toml() {
    let mut fx = Fixture::new();
    fx.set_balance(1).await;
    fx.push(2, 1).await;

    let mut coordinator = fx.coordinator(3, 0);
    coordinator.run().await.unwrap();

    let inputs = fx.prover.inputs().await;
    assert_eq!(inputs.len(), 1);

    let toml = format_prover_toml(&inputs[0]).unwrap();
    let parsed: toml::Value = toml.parse().expect("valid TOML");
    let values = parsed["encrypted_values"].as_array().unwrap();
    assert_eq!(values.len(), 6);
    assert_eq!(values[5]["x"].as_str(), Some(PADDING_WORD));
}

#[tokio::test]
async fn test_prover_failure_leaves_ledger_untouched() {
    let mut fx = Fixture::with_prover(MockProver::failing("nargo execute failed"));
    fx.set_balance(7).await;
    fx.push(3, 1).await;

    let mut coordinator = fx.coordinator(4, 0);
    let err = coordinator.run().await.unwrap_err();

    assert!(matches!(err, CoordinatorError::Prover(ProverError::ProofFailed(_))));
    assert_eq!(coordinator.state(), RunState::Failed);
    assert_eq!(fx.onchain_balance().await, 7);
    assert!(!fx.ledger.pending_transfer(fx.account, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_claim_makes_selection_stale() {
    let mut fx = Fixture::new();
    fx.set_balance(7).await;
    fx.push(3, 1).await;

    let mut first = fx.coordinator(4, 0);
    let mut second = fx.coordinator(4, 0);
    first.init().await.unwrap();
    second.init().await.unwrap();

    first.generate_proof().await.unwrap();
    second.generate_proof().await.unwrap();
    first.submit().await.unwrap();

    let err = second.submit().await.unwrap_err();
    assert!(matches!(err, CoordinatorError::StaleSelection { index: 0 }));
    assert_eq!(fx.onchain_balance().await, 10);
    assert_eq!(fx.ledger.submissions().await.len(), 1);
}
