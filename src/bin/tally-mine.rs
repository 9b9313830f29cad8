#![forbid(unsafe_code)]
use std::env;
use std::time::Instant;
use tallychain::blockchain::{Blockchain, MiningOutcome};
use tallychain::config::load_config;
use tallychain::crypto::Address;
use tallychain::persistence::Database;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <reward-address>", args[0]);
        return Ok(());
    }
    let reward_address: Address = args[1].parse()?;

    let config = load_config()?;
    let db = Database::open(&config.database.path)?;
    let mut chain = Blockchain::open(
        config.chain.difficulty,
        config.chain.mining_reward,
        Box::new(db),
    )?;

    println!(
        "Mining {} pending transactions at difficulty {}...",
        chain.pending_transactions().len(),
        chain.difficulty()
    );

    let start = Instant::now();
    match chain.mine_pending_transactions(&reward_address)? {
        MiningOutcome::Mined { height } => {
            println!(
                "Block {} mined in {:.2} seconds",
                height,
                start.elapsed().as_secs_f64()
            );
            if let Some(block) = chain.block_at(height) {
                println!("Hash: {}", block.hash());
                println!("Nonce: {}", block.nonce());
                println!("Transactions: {}", block.transactions().len());
            }
            println!(
                "Reward of {} credited to {}",
                chain.mining_reward(),
                reward_address
            );
            println!("Your balance: {}", chain.get_balance(&reward_address));
        }
        MiningOutcome::NoPendingTransactions => println!("No pending transactions to mine."),
        MiningOutcome::Cancelled => println!("Mining was cancelled."),
    }
    Ok(())
}
