//! Pending transfer aggregator for the private token contract.
//!
//! Folds an account's queue of encrypted incoming transfers into its
//! encrypted balance, proves the aggregation with the Noir circuit and
//! submits it on-chain.
//!
//! Run with:
//!   cargo run --bin aggregator -- --config config.toml process
//!   cargo run --bin aggregator -- --config config.toml pending
//!   cargo run --bin aggregator -- --config config.toml balance

use std::path::PathBuf;

use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::{AggregatorConfig, ETH_PRIVATE_KEY_ENV};
use jubjub_aggregator::adapters::bb_prover::{format_prover_toml, BBProver};
use jubjub_aggregator::adapters::ethereum::EthereumLedger;
use jubjub_aggregator::coordinator::{ProcessTransferCoordinator, RunOutcome};
use jubjub_aggregator::crypto::babyjubjub::BabyJubJub;
use jubjub_aggregator::crypto::elgamal::{decrypt, DiscreteLogTable, SecretKey};
use jubjub_aggregator::domain::transfer::PendingSlot;
use jubjub_aggregator::ports::ledger::LedgerReader;

#[derive(clap::Parser)]
#[command(name = "aggregator", about = "Process pending encrypted transfers")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Aggregate pending transfers into the balance, prove and submit.
    Process {
        /// Packed BabyJubJub public key of the account. Defaults to the configured key.
        #[arg(long)]
        account: Option<B256>,
        /// Receives the processing fees. Defaults to the signer address.
        #[arg(long)]
        fee_recipient: Option<Address>,
        /// Decimal or 0x-prefixed hex.
        #[arg(long)]
        min_fee: Option<U256>,
        #[arg(long)]
        max_transfers: Option<usize>,
        /// Print the selection and Prover.toml without proving or submitting.
        #[arg(long)]
        dry_run: bool,
    },
    /// List the account's pending transfer queue.
    Pending {
        #[arg(long)]
        account: Option<B256>,
    },
    /// Decrypt the configured account's balance.
    Balance,
}

#[derive(Debug, thiserror::Error)]
enum AggregatorError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("ledger error: {0}")]
    Ledger(#[from] jubjub_aggregator::ports::ledger::LedgerError),

    #[error("coordinator error: {0}")]
    Coordinator(#[from] jubjub_aggregator::coordinator::CoordinatorError),

    #[error("prover error: {0}")]
    Prover(#[from] jubjub_aggregator::ports::prover::ProverError),

    #[error("decryption error: {0}")]
    Decrypt(#[from] jubjub_aggregator::crypto::elgamal::ElGamalError),

    #[error("missing {0}")]
    Missing(String),

    #[error("invalid key: {0}")]
    Key(String),
}

/// Returns a block explorer link for the given transaction hash, or a raw hash if no explorer is configured.
fn tx_link(explorer_url: Option<&str>, tx_hash: B256) -> String {
    match explorer_url {
        Some(base) => format!("{base}/{tx_hash:#x}"),
        None => format!("{tx_hash:#x}"),
    }
}

fn secret_key(config: &AggregatorConfig) -> Option<SecretKey> {
    config.account.private_key.map(SecretKey::from_b256)
}

/// `--account`, or the packed public key of the configured BabyJubJub key.
fn resolve_account(config: &AggregatorConfig, account: Option<B256>) -> Result<B256, AggregatorError> {
    account
        .or_else(|| secret_key(config).map(|sk| sk.public_key().pack()))
        .ok_or_else(|| {
            AggregatorError::Missing("--account or account.private_key (BOJ_PRIVATE_KEY)".into())
        })
}

fn eth_signer(config: &AggregatorConfig) -> Result<Option<PrivateKeySigner>, AggregatorError> {
    config
        .chain
        .private_key
        .as_deref()
        .map(|key| {
            key.parse::<PrivateKeySigner>()
                .map_err(|e| AggregatorError::Key(format!("chain.private_key: {e}")))
        })
        .transpose()
}

#[tokio::main]
async fn main() -> Result<(), AggregatorError> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = AggregatorConfig::load(&args.config)?;

    match args.command {
        Command::Process {
            account,
            fee_recipient,
            min_fee,
            max_transfers,
            dry_run,
        } => {
            let mut policy = config.aggregation.selection_policy();
            if let Some(min_fee) = min_fee {
                policy.min_fee = min_fee;
            }
            if let Some(k) = max_transfers {
                if !(1..=255).contains(&k) {
                    return Err(config::ConfigError::Validation(format!(
                        "--max-transfers must be between 1 and 255, got {k}"
                    ))
                    .into());
                }
                policy.max_transfers = k;
            }
            process(&config, account, fee_recipient, policy, dry_run).await
        }
        Command::Pending { account } => pending(&config, account).await,
        Command::Balance => balance(&config).await,
    }
}

async fn process(
    config: &AggregatorConfig,
    account: Option<B256>,
    fee_recipient: Option<Address>,
    policy: jubjub_aggregator::domain::selection::SelectionPolicy,
    dry_run: bool,
) -> Result<(), AggregatorError> {
    let account = resolve_account(config, account)?;
    let signer = eth_signer(config)?;

    let ledger = if dry_run {
        EthereumLedger::read_only(&config.chain.rpc_url, config.chain.private_token_address)?
    } else {
        let key = config.chain.private_key.as_deref().ok_or_else(|| {
            AggregatorError::Missing(format!("chain.private_key ({ETH_PRIVATE_KEY_ENV}) to submit"))
        })?;
        EthereumLedger::new(&config.chain.rpc_url, key, config.chain.private_token_address).await?
    };

    let fee_recipient = fee_recipient
        .or_else(|| signer.as_ref().map(|s| s.address()))
        .unwrap_or(Address::ZERO);

    let prover = BBProver::new(config.prover.circuits_dir.clone(), &config.prover.circuit_name)
        .with_binaries(&config.prover.nargo, &config.prover.bb)
        .with_timeout(config.prover.timeout);

    let mut coordinator = ProcessTransferCoordinator::new(
        ledger.clone(),
        ledger,
        prover,
        BabyJubJub,
        account,
        fee_recipient,
    )
    .with_policy(policy)
    .with_empty_queue(config.aggregation.empty_queue);

    info!(
        %account,
        %fee_recipient,
        max_transfers = policy.max_transfers,
        min_fee = %policy.min_fee,
        "processing pending transfers"
    );

    if dry_run {
        let run = coordinator.init().await?;
        info!(
            selected = ?run.outcome.selected_indexes(),
            folded = ?run.outcome.folded,
            skipped_empty = ?run.outcome.skipped_empty,
            "dry run, nothing proven or submitted"
        );
        println!("{}", format_prover_toml(&run.proof_input)?);
        return Ok(());
    }

    match coordinator.run().await? {
        RunOutcome::Skipped { scanned } => {
            info!(scanned, "no eligible pending transfers");
        }
        RunOutcome::Submitted {
            receipt,
            selected_indexes,
            ..
        } => {
            info!(
                indexes = ?selected_indexes,
                tx = %tx_link(config.chain.explorer_url.as_deref(), receipt.tx_hash),
                "pending transfers processed"
            );
        }
    }
    Ok(())
}

async fn pending(config: &AggregatorConfig, account: Option<B256>) -> Result<(), AggregatorError> {
    let account = resolve_account(config, account)?;
    let ledger =
        EthereumLedger::read_only(&config.chain.rpc_url, config.chain.private_token_address)?;
    let policy = config.aggregation.selection_policy();

    let count = ledger.pending_transfer_count(account).await?;
    info!(%account, count, "pending transfer queue");

    for index in 0..count {
        match ledger.pending_transfer(account, index).await? {
            PendingSlot::Empty => println!("{index:>4}  empty"),
            PendingSlot::Present(transfer) => println!(
                "{index:>4}  fee {:<12} {}",
                transfer.fee.to_string(),
                match policy.check(&transfer) {
                    Ok(()) => "eligible".to_string(),
                    Err(reason) => format!("not eligible: {reason}"),
                }
            ),
        }
    }
    Ok(())
}

async fn balance(config: &AggregatorConfig) -> Result<(), AggregatorError> {
    let sk = secret_key(config).ok_or_else(|| {
        AggregatorError::Missing("account.private_key (BOJ_PRIVATE_KEY) to decrypt".into())
    })?;
    let account = sk.public_key().pack();
    let ledger =
        EthereumLedger::read_only(&config.chain.rpc_url, config.chain.private_token_address)?;

    let encrypted = ledger.balance(account).await?.to_ciphertext();
    info!(%account, "decrypting balance");
    let amount = decrypt(&sk, &encrypted, &DiscreteLogTable::default())?;
    println!("{amount}");
    Ok(())
}
