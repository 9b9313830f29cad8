//! Cryptographic primitives for TallyChain

use crate::error::ChainError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::RngCore;
use ripemd::Ripemd160;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A thread-safe, lazily initialized Secp256k1 context.
/// This prevents repeated, unnecessary context creation.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Version byte prepended to the hash160 payload of every address.
pub const ADDRESS_VERSION: u8 = 0x00;

/// Decoded address length: 1 version byte + 20-byte hash160 + 4-byte checksum.
pub const ADDRESS_DECODED_LEN: usize = 25;

/// Sentinel sender recorded on mint transactions. Contains characters outside
/// the base58 alphabet, so it can never collide with a derived address.
pub const COINBASE_SENDER: &str = "COINBASE";

/// Derived symmetric key length in bytes (AES-256).
pub const SYMMETRIC_KEY_LEN: usize = 32;

/// Salt length for password-based key derivation.
pub const SALT_LEN: usize = 16;

/// AES-GCM nonce length; the nonce is prepended to every ciphertext.
const NONCE_LEN: usize = 12;

/// Argon2id cost parameters. Fixed so a (password, salt) pair always derives
/// the same key.
const KDF_MEM_COST_KIB: u32 = 19_456;
const KDF_TIME_COST: u32 = 2;
const KDF_LANES: u32 = 1;

/// A base58check account address derived one-way from a public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Derives the address for a public key: sha256 of the compressed key,
    /// ripemd160 of that digest, version byte in front, 4-byte double-sha256
    /// checksum behind, base58-encoded.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let pubkey_bytes: [u8; PUBLIC_KEY_SIZE] = public_key.serialize();
        let sha = Sha256::digest(pubkey_bytes);
        let hash160 = Ripemd160::digest(sha);

        let mut payload = Vec::with_capacity(ADDRESS_DECODED_LEN);
        payload.push(ADDRESS_VERSION);
        payload.extend_from_slice(&hash160);

        let checksum = Sha256::digest(Sha256::digest(&payload));
        payload.extend_from_slice(&checksum[..4]);

        Address(bs58::encode(payload).into_string())
    }

    /// The sender recorded on mint (mining reward) transactions.
    pub fn coinbase() -> Self {
        Address(COINBASE_SENDER.to_string())
    }

    pub fn is_coinbase(&self) -> bool {
        self.0 == COINBASE_SENDER
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = ChainError;

    /// Parses and fully validates a base58check address: the decoded form
    /// must be exactly 25 bytes and the trailing checksum must match the
    /// double-sha256 of the preceding 21 bytes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| ChainError::CryptoError(format!("Invalid base58 address: {}", e)))?;

        if decoded.len() != ADDRESS_DECODED_LEN {
            return Err(ChainError::CryptoError(format!(
                "Address must decode to {} bytes, got {}",
                ADDRESS_DECODED_LEN,
                decoded.len()
            )));
        }

        let (payload, checksum) = decoded.split_at(ADDRESS_DECODED_LEN - 4);
        let expected = Sha256::digest(Sha256::digest(payload));
        if checksum != &expected[..4] {
            return Err(ChainError::CryptoError(
                "Address checksum mismatch".to_string(),
            ));
        }

        Ok(Address(s.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Result<Self, ChainError> {
        let secret_key = SecretKey::new(&mut OsRng);
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);

        Ok(KeyPair {
            secret_key,
            public_key,
        })
    }

    /// Creates a KeyPair from an existing SecretKey.
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Creates a KeyPair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::CryptoError(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::CryptoError(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    /// Creates a KeyPair from a hex-encoded secret key. Exact inverse of
    /// [`KeyPair::secret_key_hex`].
    pub fn from_secret_hex(hex_str: &str) -> Result<Self, ChainError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| ChainError::CryptoError(format!("Invalid secret key hex: {}", e)))?;
        Self::from_secret_bytes(&bytes)
    }

    /// Returns the secret key as a hex string.
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Computes the base58check account address for this key pair.
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }

    /// Returns the KeyPair's public key as a compressed byte array.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    /// Signs a message (which is first hashed using SHA-256) and returns the
    /// compact signature bytes. ECDSA signing here is deterministic
    /// (RFC 6979), so signing the same message twice yields the same bytes.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; COMPACT_SIGNATURE_SIZE], ChainError> {
        let digest = Sha256::digest(message);

        let message = Message::from_digest_slice(&digest)
            .map_err(|e| ChainError::CryptoError(format!("Failed to create message: {}", e)))?;

        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret_key);

        Ok(signature.serialize_compact())
    }
}

/// Verifies an ECDSA signature given the raw compressed public key bytes, the
/// message, and the compact signature bytes. Malformed keys or signatures
/// yield `false`, never an error.
pub fn verify_signature(public_key_bytes: &[u8], message: &[u8], signature_bytes: &[u8]) -> bool {
    let public_key = match PublicKey::from_slice(public_key_bytes) {
        Ok(pk) => pk,
        Err(_) => return false,
    };
    let signature = match Signature::from_compact(signature_bytes) {
        Ok(sig) => sig,
        Err(_) => return false,
    };

    let digest = Sha256::digest(message);
    let message = match Message::from_digest_slice(&digest) {
        Ok(m) => m,
        Err(_) => return false,
    };

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .is_ok()
}

/// SHA-256 of `data`, hex-encoded. All content ids in the ledger (transaction
/// ids, block hashes) come through here.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Derives a symmetric key from a password with Argon2id under fixed cost
/// parameters. A fresh 16-byte salt is drawn when none is supplied; the same
/// (password, salt) pair always derives the same key.
pub fn derive_key_from_password(
    password: &str,
    salt: Option<[u8; SALT_LEN]>,
) -> Result<([u8; SYMMETRIC_KEY_LEN], [u8; SALT_LEN]), ChainError> {
    let salt = match salt {
        Some(s) => s,
        None => {
            let mut s = [0u8; SALT_LEN];
            OsRng.fill_bytes(&mut s);
            s
        }
    };

    let params = argon2::Params::new(
        KDF_MEM_COST_KIB,
        KDF_TIME_COST,
        KDF_LANES,
        Some(SYMMETRIC_KEY_LEN),
    )
    .map_err(|e| ChainError::CryptoError(format!("Invalid KDF parameters: {}", e)))?;
    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = [0u8; SYMMETRIC_KEY_LEN];
    argon2
        .hash_password_into(password.as_bytes(), &salt, &mut key)
        .map_err(|e| ChainError::CryptoError(format!("Key derivation failed: {}", e)))?;

    Ok((key, salt))
}

/// Encrypts `plaintext` with AES-256-GCM. The random 12-byte nonce is
/// prepended to the returned ciphertext.
pub fn encrypt(plaintext: &[u8], key: &[u8; SYMMETRIC_KEY_LEN]) -> Result<Vec<u8>, ChainError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| ChainError::CryptoError("Encryption failed".to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts a nonce-prefixed AES-256-GCM ciphertext. A wrong key or any
/// corruption fails the authentication tag and returns `CryptoError`.
pub fn decrypt(data: &[u8], key: &[u8; SYMMETRIC_KEY_LEN]) -> Result<Vec<u8>, ChainError> {
    if data.len() < NONCE_LEN {
        return Err(ChainError::CryptoError(
            "Ciphertext too short to contain a nonce".to_string(),
        ));
    }
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| {
            ChainError::CryptoError("Decryption failed: wrong key or corrupted data".to_string())
        })
}
