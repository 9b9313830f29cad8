//! Error types for TallyChain

use std::fmt;

#[derive(Debug, Clone)]
pub enum ChainError {
    InvalidTransaction(String),
    InsufficientBalance { available: f64, required: f64 },
    DuplicateTransaction(String),
    CryptoError(String),
    ChainIntegrityError { height: u64, reason: String },
    InvalidBlock(String),
    WalletError(String),
    DatabaseError(String),
    ConfigError(String),
    IoError(String),
    SerializationError(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainError::InvalidTransaction(msg) => write!(f, "Invalid transaction: {}", msg),
            ChainError::InsufficientBalance {
                available,
                required,
            } => write!(
                f,
                "Insufficient balance. Available: {}, Required: {}",
                available, required
            ),
            ChainError::DuplicateTransaction(id) => {
                write!(f, "Transaction {} already exists in pool", id)
            }
            ChainError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
            ChainError::ChainIntegrityError { height, reason } => {
                write!(f, "Chain integrity error at block {}: {}", height, reason)
            }
            ChainError::InvalidBlock(msg) => write!(f, "Invalid block: {}", msg),
            ChainError::WalletError(msg) => write!(f, "Wallet error: {}", msg),
            ChainError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            ChainError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            ChainError::IoError(msg) => write!(f, "IO error: {}", msg),
            ChainError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
