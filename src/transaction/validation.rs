/// Validation logic for transactions separated from type definitions
use crate::crypto;
use crate::error::ChainError;
use crate::transaction::types::{Transaction, TransactionKind, MAX_MESSAGE_LENGTH};

impl Transaction {
    /// Structural validation. Balance sufficiency is the ledger's
    /// responsibility, not the transaction's; this checks only what the
    /// record itself can prove.
    pub fn validate(&self) -> Result<(), ChainError> {
        if !self.amount().is_finite() || self.amount() <= 0.0 {
            return Err(ChainError::InvalidTransaction(
                "Amount must be positive".to_string(),
            ));
        }
        if !self.fee().is_finite() || self.fee() < 0.0 {
            return Err(ChainError::InvalidTransaction(
                "Fee cannot be negative".to_string(),
            ));
        }
        if let Some(message) = self.message() {
            if message.len() > MAX_MESSAGE_LENGTH {
                return Err(ChainError::InvalidTransaction(format!(
                    "Message exceeds maximum length of {} characters",
                    MAX_MESSAGE_LENGTH
                )));
            }
        }

        match self.kind() {
            TransactionKind::Transfer => {
                if self.sender().is_empty() || self.recipient().is_empty() {
                    return Err(ChainError::InvalidTransaction(
                        "Invalid sender or recipient address".to_string(),
                    ));
                }
                if self.sender() == self.recipient() {
                    return Err(ChainError::InvalidTransaction(
                        "Sender and recipient cannot be the same".to_string(),
                    ));
                }
                if self.signature().is_none() {
                    return Err(ChainError::InvalidTransaction(
                        "Transaction not signed".to_string(),
                    ));
                }
            }
            TransactionKind::Mint => {
                if self.recipient().is_empty() {
                    return Err(ChainError::InvalidTransaction(
                        "Mint recipient cannot be empty".to_string(),
                    ));
                }
                if self.fee() != 0.0 {
                    return Err(ChainError::InvalidTransaction(
                        "Mint transactions carry no fee".to_string(),
                    ));
                }
            }
        }

        // Identity link: the id must be the content hash of the committed
        // fields, so any post-signing edit is detectable.
        let id = self.id().ok_or_else(|| {
            ChainError::InvalidTransaction("Transaction has no id".to_string())
        })?;
        let expected = crypto::content_hash(self.canonical_payload().as_bytes());
        if id != expected {
            return Err(ChainError::InvalidTransaction(
                "Transaction id does not match its contents".to_string(),
            ));
        }

        Ok(())
    }
}
