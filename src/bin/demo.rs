//! Pending Transfer Aggregation Demo
//!
//! Runs the aggregation flow in-process against an in-memory ledger and a
//! canned prover. Balances and transfers are real BabyJubJub ElGamal
//! ciphertexts, so the decrypted balance can be checked after each run.
//!
//! Run with: `cargo run --bin demo`

use std::sync::Arc;

use alloy::primitives::{Address, U256};

use jubjub_aggregator::adapters::mock_ledger::MockLedger;
use jubjub_aggregator::adapters::mock_prover::MockProver;
use jubjub_aggregator::coordinator::{ProcessTransferCoordinator, RunOutcome};
use jubjub_aggregator::crypto::babyjubjub::BabyJubJub;
use jubjub_aggregator::crypto::elgamal::{decrypt, encrypt, DiscreteLogTable, SecretKey};
use jubjub_aggregator::domain::selection::SelectionPolicy;
use jubjub_aggregator::ports::ledger::LedgerReader;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("=== Encrypted Balance Aggregation ===");
    println!("=== Demo (mock ledger, no real proofs) ===\n");

    // ── Setup ──
    println!("[Setup] Generating BabyJubJub key...");
    let mut rng = ark_std::test_rng();
    let sk = SecretKey::random(&mut rng);
    let pk = sk.public_key();
    let account = pk.pack();
    let fee_recipient = Address::repeat_byte(0xfe);
    let table = DiscreteLogTable::new(1 << 20);
    println!("  Account (packed pk): 0x{}...", &hex::encode(account.0)[..16]);

    let ledger = Arc::new(MockLedger::new());
    let prover = Arc::new(MockProver::new());

    ledger.set_balance(account, encrypt(&pk, 100, &mut rng)).await;
    println!("  Initial balance: 100");

    // ── Incoming transfers ──
    println!("\n[Queue] Senders enqueue encrypted transfers...");
    let transfers: [(u64, u64); 5] = [(25, 5), (10, 1), (60, 4), (40, 3), (7, 2)];
    for (amount, fee) in transfers {
        let index = ledger
            .push_transfer(account, encrypt(&pk, amount, &mut rng), U256::from(fee))
            .await;
        println!("  [{index}] amount {amount:>3}, fee {fee}");
    }
    ledger.clear_transfer(account, 2).await;
    println!("  [2] claimed elsewhere, slot zeroed");

    let mut coordinator = ProcessTransferCoordinator::new(
        ledger.clone(),
        ledger.clone(),
        prover.clone(),
        BabyJubJub,
        account,
        fee_recipient,
    )
    .with_policy(SelectionPolicy::new(2, U256::ZERO));

    // ── Run 1 ──
    println!("\n[Run 1] K = 2, min fee 0");
    let run = coordinator.init().await.unwrap();
    println!("  Selected:      {:?}", run.outcome.selected_indexes());
    println!("  Folded:        {:?}", run.outcome.folded);
    println!("  Skipped empty: {:?}", run.outcome.skipped_empty);
    println!(
        "  Proof input:   {} of {} transfer slots used",
        run.proof_input.transfer_count(),
        run.proof_input.encrypted_values.len() / 2
    );

    let proof = coordinator.generate_proof().await.unwrap();
    println!("  Proof: {} bytes", proof.proof.len());
    let receipt = coordinator.submit().await.unwrap();
    println!("  Submitted: {:#x}", receipt.tx_hash);
    print_balance(&ledger, &sk, &table).await;
    println!("  (100 + 25 + 10; indexes 3 and 4 wait for the next run)");

    // ── Run 2 ──
    println!("\n[Run 2] Remaining queue");
    match coordinator.run().await.unwrap() {
        RunOutcome::Submitted {
            selected_indexes, ..
        } => println!("  Processed indexes {selected_indexes:?}"),
        RunOutcome::Skipped { .. } => println!("  Nothing to process"),
    }
    print_balance(&ledger, &sk, &table).await;

    // ── Run 3 ──
    println!("\n[Run 3] Queue drained");
    match coordinator.run().await.unwrap() {
        RunOutcome::Skipped { scanned } => {
            println!("  Skipped after scanning {scanned} slots")
        }
        RunOutcome::Submitted { .. } => println!("  Unexpected submission"),
    }

    println!(
        "\n=== Done: {} submissions, {} proofs ===",
        ledger.submissions().await.len(),
        prover.inputs().await.len()
    );
}

async fn print_balance(ledger: &MockLedger, sk: &SecretKey, table: &DiscreteLogTable) {
    let account = sk.public_key().pack();
    let balance = ledger.balance(account).await.unwrap().to_ciphertext();
    println!("  Decrypted balance: {}", decrypt(sk, &balance, table).unwrap());
}
