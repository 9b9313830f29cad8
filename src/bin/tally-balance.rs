#![forbid(unsafe_code)]
use std::env;
use tallychain::blockchain::Blockchain;
use tallychain::config::load_config;
use tallychain::crypto::Address;
use tallychain::persistence::Database;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <address> [history-limit]", args[0]);
        return Ok(());
    }
    let address: Address = args[1].parse()?;
    let limit: usize = match args.get(2) {
        Some(raw) => raw.parse()?,
        None => 10,
    };

    let config = load_config()?;
    let db = Database::open(&config.database.path)?;
    let chain = Blockchain::open(
        config.chain.difficulty,
        config.chain.mining_reward,
        Box::new(db),
    )?;

    let info = chain.info();
    println!("Address: {}", address);
    println!("Balance: {:.6}", chain.get_balance(&address));
    println!(
        "Chain: {} blocks, difficulty {}, {} pending, valid: {}",
        info.total_blocks, info.difficulty, info.pending_transactions, info.is_valid
    );

    let history = chain.get_transaction_history(&address, limit);
    if history.is_empty() {
        println!("No transactions for this address.");
        return Ok(());
    }

    println!("Recent transactions:");
    for tx in history {
        let direction = if tx.recipient() == &address {
            "received"
        } else {
            "sent"
        };
        println!(
            "  [{}] {} {:.6} (fee {:.6}) {}",
            tx.status().as_str(),
            direction,
            tx.amount(),
            tx.fee(),
            tx.id().unwrap_or("-"),
        );
    }
    Ok(())
}
