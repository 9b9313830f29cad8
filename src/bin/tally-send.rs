#![forbid(unsafe_code)]
use std::env;
use std::path::Path;
use tallychain::blockchain::Blockchain;
use tallychain::config::load_config;
use tallychain::crypto::Address;
use tallychain::persistence::Database;
use tallychain::transaction::Transaction;
use tallychain::wallet::Wallet;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <recipient> <amount> [fee] [message]", args[0]);
        return Ok(());
    }
    let recipient: Address = args[1].parse()?;
    let amount: f64 = args[2].parse()?;
    let fee: f64 = match args.get(3) {
        Some(raw) => raw.parse()?,
        None => 0.001,
    };
    let message = args.get(4).cloned();

    let config = load_config()?;
    let password = rpassword::prompt_password("Wallet password: ")?;
    let wallet = Wallet::load_encrypted(Path::new(&config.wallet.file), &password)?;

    let db = Database::open(&config.database.path)?;
    let mut chain = Blockchain::open(
        config.chain.difficulty,
        config.chain.mining_reward,
        Box::new(db),
    )?;

    let mut tx = Transaction::new(wallet.address().clone(), recipient, amount, fee, message);
    wallet.sign_transaction(&mut tx)?;
    let id = chain.add_transaction(tx)?;

    println!("Transaction accepted (pending until the next block is mined)");
    println!("Transaction ID: {}", id);
    println!("Amount: {}", amount);
    println!("Fee: {}", fee);
    println!("Recipient: {}", args[1]);
    println!("Pending queue: {} transactions", chain.pending_transactions().len());
    Ok(())
}
