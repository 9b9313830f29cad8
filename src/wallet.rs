//! Wallet: key custody and password-encrypted snapshot persistence.
//!
//! The private key lives in memory for exactly as long as the `Wallet` value
//! does; dropping the wallet is how it locks.

use crate::crypto::{self, Address, KeyPair, SALT_LEN};
use crate::error::ChainError;
use crate::transaction::Transaction;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const WALLET_FORMAT_VERSION: &str = "1.0";

/// On-disk snapshot: ciphertext plus the KDF salt needed to re-derive the
/// key from the password.
#[derive(Debug, Serialize, Deserialize)]
struct WalletFile {
    encrypted_wallet: String,
    salt: String,
    version: String,
}

/// The plaintext inside the snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct WalletData {
    address: String,
    private_key: String,
    created_at: String,
    version: String,
}

#[derive(Debug)]
pub struct Wallet {
    keypair: KeyPair,
    address: Address,
    created_at: String,
}

impl Wallet {
    /// Generates a fresh key pair and derives its address.
    pub fn generate() -> Result<Self, ChainError> {
        let keypair = KeyPair::generate()?;
        let address = keypair.address();
        Ok(Wallet {
            keypair,
            address,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Imports a wallet from a hex-encoded private key.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, ChainError> {
        let keypair = KeyPair::from_secret_hex(secret_hex)?;
        let address = keypair.address();
        Ok(Wallet {
            keypair,
            address,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub fn secret_key_hex(&self) -> String {
        self.keypair.secret_key_hex()
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    /// Signs a transaction with this wallet's key.
    pub fn sign_transaction(&self, transaction: &mut Transaction) -> Result<(), ChainError> {
        transaction.sign(&self.keypair)
    }

    /// Encrypts the key material under a password-derived key and writes the
    /// snapshot file.
    pub fn save_encrypted(&self, path: &Path, password: &str) -> Result<(), ChainError> {
        let data = WalletData {
            address: self.address.to_string(),
            private_key: self.secret_key_hex(),
            created_at: self.created_at.clone(),
            version: WALLET_FORMAT_VERSION.to_string(),
        };
        let plaintext = serde_json::to_vec(&data)?;

        let (key, salt) = crypto::derive_key_from_password(password, None)?;
        let ciphertext = crypto::encrypt(&plaintext, &key)?;

        let file = WalletFile {
            encrypted_wallet: BASE64.encode(ciphertext),
            salt: hex::encode(salt),
            version: WALLET_FORMAT_VERSION.to_string(),
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;

        log::info!("Wallet for {} saved to {}", self.address, path.display());
        Ok(())
    }

    /// Reads a snapshot file and decrypts it with the password. A wrong
    /// password fails the ciphertext's authentication tag and surfaces as a
    /// `CryptoError`.
    pub fn load_encrypted(path: &Path, password: &str) -> Result<Self, ChainError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            ChainError::WalletError(format!("Cannot read wallet file {}: {}", path.display(), e))
        })?;
        let file: WalletFile = serde_json::from_str(&raw)?;

        let salt_bytes = hex::decode(&file.salt)
            .map_err(|e| ChainError::WalletError(format!("Invalid salt: {}", e)))?;
        let salt: [u8; SALT_LEN] = salt_bytes
            .try_into()
            .map_err(|_| ChainError::WalletError(format!("Salt must be {} bytes", SALT_LEN)))?;

        let ciphertext = BASE64
            .decode(&file.encrypted_wallet)
            .map_err(|e| ChainError::WalletError(format!("Invalid ciphertext encoding: {}", e)))?;

        let (key, _) = crypto::derive_key_from_password(password, Some(salt))?;
        let plaintext = crypto::decrypt(&ciphertext, &key)?;
        let data: WalletData = serde_json::from_slice(&plaintext)?;

        let mut wallet = Self::from_secret_hex(&data.private_key)?;
        wallet.created_at = data.created_at;

        if data.address != wallet.address.to_string() {
            return Err(ChainError::WalletError(
                "Stored address does not match the key in the snapshot".to_string(),
            ));
        }

        log::info!("Wallet for {} loaded from {}", wallet.address, path.display());
        Ok(wallet)
    }

    /// Checks that a string is a well-formed base58check address.
    pub fn is_address_valid(address: &str) -> bool {
        address.parse::<Address>().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_and_reimport() {
        let wallet = Wallet::generate().unwrap();
        let imported = Wallet::from_secret_hex(&wallet.secret_key_hex()).unwrap();
        assert_eq!(wallet.address(), imported.address());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallet.json");

        let wallet = Wallet::generate().unwrap();
        wallet.save_encrypted(&path, "correct horse").unwrap();

        let loaded = Wallet::load_encrypted(&path, "correct horse").unwrap();
        assert_eq!(wallet.address(), loaded.address());
        assert_eq!(wallet.secret_key_hex(), loaded.secret_key_hex());
        assert_eq!(wallet.created_at(), loaded.created_at());
    }

    #[test]
    fn test_wrong_password_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallet.json");

        let wallet = Wallet::generate().unwrap();
        wallet.save_encrypted(&path, "right").unwrap();

        let err = Wallet::load_encrypted(&path, "wrong").unwrap_err();
        assert!(matches!(err, ChainError::CryptoError(_)));
    }

    #[test]
    fn test_snapshot_file_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallet.json");

        let wallet = Wallet::generate().unwrap();
        wallet.save_encrypted(&path, "pw").unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["version"], WALLET_FORMAT_VERSION);
        assert_eq!(value["salt"].as_str().unwrap().len(), SALT_LEN * 2);
        // The key material never appears in the clear
        assert!(!raw.contains(&wallet.secret_key_hex()));
        assert!(value["encrypted_wallet"].is_string());
    }

    #[test]
    fn test_wallet_signs_transactions() {
        let wallet = Wallet::generate().unwrap();
        let recipient = Wallet::generate().unwrap();

        let mut tx = Transaction::new(
            wallet.address().clone(),
            recipient.address().clone(),
            1.0,
            0.001,
            None,
        );
        wallet.sign_transaction(&mut tx).unwrap();

        assert!(tx.validate().is_ok());
        assert!(tx.verify(&wallet.keypair().public_key_bytes()));
    }

    #[test]
    fn test_address_validation() {
        let wallet = Wallet::generate().unwrap();
        assert!(Wallet::is_address_valid(wallet.address().as_str()));
        assert!(!Wallet::is_address_valid("not-an-address"));
        assert!(!Wallet::is_address_valid(""));
    }
}
