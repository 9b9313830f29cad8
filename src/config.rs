//! Configuration management for TallyChain

use crate::blockchain::{DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD};
use crate::error::ChainError;
use serde::Deserialize;
use std::fs;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
}

#[derive(Debug, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    #[serde(default = "default_mining_reward")]
    pub mining_reward: f64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            mining_reward: default_mining_reward(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_wallet_file")]
    pub file: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            file: default_wallet_file(),
        }
    }
}

fn default_difficulty() -> u32 {
    DEFAULT_DIFFICULTY
}

fn default_mining_reward() -> f64 {
    DEFAULT_MINING_REWARD
}

fn default_db_path() -> String {
    "./tallychain.db".to_string()
}

fn default_wallet_file() -> String {
    "wallet.json".to_string()
}

/// Loads `config.toml` from the working directory; a missing file yields the
/// defaults.
pub fn load_config() -> Result<Config, ChainError> {
    load_config_from("config.toml")
}

pub fn load_config_from(path: &str) -> Result<Config, ChainError> {
    let config_str = fs::read_to_string(path).unwrap_or_default();
    let config: Config = if config_str.is_empty() {
        Config::default()
    } else {
        toml::from_str(&config_str).map_err(|e| ChainError::ConfigError(e.to_string()))?
    };

    // Validate critical values
    if config.database.path.is_empty() {
        return Err(ChainError::ConfigError(
            "database.path must not be empty".to_string(),
        ));
    }
    if config.wallet.file.is_empty() {
        return Err(ChainError::ConfigError(
            "wallet.file must not be empty".to_string(),
        ));
    }
    if !config.chain.mining_reward.is_finite() || config.chain.mining_reward <= 0.0 {
        return Err(ChainError::ConfigError(
            "chain.mining_reward must be positive".to_string(),
        ));
    }

    Ok(config)
}
