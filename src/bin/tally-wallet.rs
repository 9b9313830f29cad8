#![forbid(unsafe_code)]
use std::env;
use std::path::Path;
use tallychain::config::load_config;
use tallychain::wallet::Wallet;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = load_config()?;
    let args: Vec<String> = env::args().collect();
    let path = args.get(1).cloned().unwrap_or(config.wallet.file);
    let path = Path::new(&path);

    if path.exists() {
        let password = rpassword::prompt_password("Wallet password: ")?;
        let wallet = Wallet::load_encrypted(path, &password)?;
        println!("Wallet loaded from {}", path.display());
        println!("Address: {}", wallet.address());
        println!("Created: {}", wallet.created_at());
        return Ok(());
    }

    let wallet = Wallet::generate()?;
    let password = rpassword::prompt_password("New wallet password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        eprintln!("Passwords do not match");
        std::process::exit(1);
    }

    wallet.save_encrypted(path, &password)?;
    println!("New wallet saved to {}", path.display());
    println!("Address: {}", wallet.address());
    println!("Keep the wallet file and password safe; the key cannot be recovered without them.");
    Ok(())
}
