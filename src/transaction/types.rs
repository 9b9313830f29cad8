/// Transaction types for TallyChain
use crate::crypto::{self, Address, KeyPair};
use crate::error::ChainError;
use serde_json::json;

/// Maximum message length (256 characters)
pub const MAX_MESSAGE_LENGTH: usize = 256;

/// How a transaction entered the ledger. Only transfers are subject to
/// signature and balance rules; mints are created by mining and are the sole
/// source of new supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Transfer,
    Mint,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Transfer => "transfer",
            TransactionKind::Mint => "mint",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
        }
    }
}

/// A value-transfer record. Fields are private: once signed, a transaction
/// cannot be altered from outside this module, which keeps the id/signature
/// bound to the content they were computed over.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    kind: TransactionKind,
    sender: Address,
    recipient: Address,
    amount: f64,
    fee: f64,
    message: Option<String>,
    timestamp: u64,
    transaction_id: Option<String>,
    signature: Option<String>,
    status: TransactionStatus,
}

pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

impl Transaction {
    /// Creates an unsigned transfer. The id and signature are assigned by
    /// [`Transaction::sign`].
    pub fn new(
        sender: Address,
        recipient: Address,
        amount: f64,
        fee: f64,
        message: Option<String>,
    ) -> Self {
        Transaction {
            kind: TransactionKind::Transfer,
            sender,
            recipient,
            amount,
            fee,
            message,
            timestamp: now_millis(),
            transaction_id: None,
            signature: None,
            status: TransactionStatus::Pending,
        }
    }

    /// Creates a mint (mining reward) transaction: no fee, no signature,
    /// already confirmed, id derived from its content. Mints are assembled
    /// into blocks directly and are rejected by transaction submission.
    pub fn mint(recipient: Address, amount: f64, message: &str) -> Self {
        let mut tx = Transaction {
            kind: TransactionKind::Mint,
            sender: Address::coinbase(),
            recipient,
            amount,
            fee: 0.0,
            message: Some(message.to_string()),
            timestamp: now_millis(),
            transaction_id: None,
            signature: None,
            status: TransactionStatus::Confirmed,
        };
        tx.transaction_id = Some(crypto::content_hash(tx.canonical_payload().as_bytes()));
        tx
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn recipient(&self) -> &Address {
        &self.recipient
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn fee(&self) -> f64 {
        self.fee
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// True if `address` is this transaction's sender or recipient.
    pub fn touches(&self, address: &Address) -> bool {
        &self.sender == address || &self.recipient == address
    }

    /// The canonical sorted-key JSON rendering of the committed fields
    /// (everything except id, signature, kind and status). Both the signature
    /// and the transaction id are computed over exactly these bytes.
    pub fn canonical_payload(&self) -> String {
        json!({
            "sender": self.sender.as_str(),
            "recipient": self.recipient.as_str(),
            "amount": self.amount,
            "fee": self.fee,
            "message": self.message,
            "timestamp": self.timestamp,
        })
        .to_string()
    }

    /// The full sorted-key record of this transaction, as embedded in block
    /// hashes.
    pub(crate) fn canonical_record(&self) -> serde_json::Value {
        json!({
            "kind": self.kind.as_str(),
            "sender": self.sender.as_str(),
            "recipient": self.recipient.as_str(),
            "amount": self.amount,
            "fee": self.fee,
            "message": self.message,
            "timestamp": self.timestamp,
            "transaction_id": self.transaction_id,
            "signature": self.signature,
            "status": self.status.as_str(),
        })
    }

    /// Signs the transaction and assigns its content-hash id. Signing is
    /// idempotent for the same key (ECDSA here is deterministic); attempting
    /// to re-sign with a different key is an error.
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<(), ChainError> {
        if self.kind == TransactionKind::Mint {
            return Err(ChainError::InvalidTransaction(
                "Mint transactions are not signed".to_string(),
            ));
        }

        let payload = self.canonical_payload();
        let signature = hex::encode(keypair.sign(payload.as_bytes())?);

        if let Some(existing) = &self.signature {
            if *existing != signature {
                return Err(ChainError::InvalidTransaction(
                    "Transaction is already signed with a different key".to_string(),
                ));
            }
            return Ok(());
        }

        self.signature = Some(signature);
        self.transaction_id = Some(crypto::content_hash(payload.as_bytes()));
        Ok(())
    }

    /// Checks the signature against a public key. Unsigned transactions and
    /// malformed signatures yield `false`.
    pub fn verify(&self, public_key_bytes: &[u8]) -> bool {
        let signature = match &self.signature {
            Some(sig) => sig,
            None => return false,
        };
        let signature_bytes = match hex::decode(signature) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        crypto::verify_signature(
            public_key_bytes,
            self.canonical_payload().as_bytes(),
            &signature_bytes,
        )
    }

    /// Stamps the transaction confirmed. Called when it is drained into a
    /// block and by the pool's bookkeeping.
    pub(crate) fn confirm(&mut self) {
        self.status = TransactionStatus::Confirmed;
    }
}
