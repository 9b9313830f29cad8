//! Transaction pool: pending/confirmed bookkeeping with duplicate rejection
//! and per-address queries.

use crate::crypto::Address;
use crate::error::ChainError;
use crate::transaction::{Transaction, TransactionKind};

/// Holds transactions in two states. Pending entries keep their submission
/// order (FIFO, no fee-priority reordering); confirmed entries mirror what
/// the chain has accepted, for fast per-address lookups.
#[derive(Debug, Clone, Default)]
pub struct TransactionPool {
    pending: Vec<Transaction>,
    confirmed: Vec<Transaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and appends a transaction to the pending set. Fails with
    /// `DuplicateTransaction` if its id is already pending; nothing is
    /// changed on failure.
    pub fn add(&mut self, transaction: Transaction) -> Result<(), ChainError> {
        transaction.validate()?;

        let id = transaction
            .id()
            .ok_or_else(|| ChainError::InvalidTransaction("Transaction has no id".to_string()))?
            .to_string();

        if self.pending.iter().any(|tx| tx.id() == Some(id.as_str())) {
            return Err(ChainError::DuplicateTransaction(id));
        }

        self.pending.push(transaction);
        Ok(())
    }

    /// Moves a pending entry to the confirmed set and restamps its status.
    /// Returns false when the id is not pending; the caller decides whether
    /// that is fatal.
    pub fn confirm(&mut self, transaction_id: &str) -> bool {
        match self
            .pending
            .iter()
            .position(|tx| tx.id() == Some(transaction_id))
        {
            Some(pos) => {
                let mut tx = self.pending.remove(pos);
                tx.confirm();
                self.confirmed.push(tx);
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn confirmed(&self) -> &[Transaction] {
        &self.confirmed
    }

    /// Looks an id up among pending entries first, then confirmed ones.
    pub fn get(&self, transaction_id: &str) -> Option<&Transaction> {
        self.pending
            .iter()
            .chain(self.confirmed.iter())
            .find(|tx| tx.id() == Some(transaction_id))
    }

    /// Sums confirmed receipts minus confirmed spends (amount plus fee) for
    /// an address. Pending transactions never count, so unconfirmed funds
    /// cannot be spent.
    pub fn balance_for(&self, address: &Address) -> f64 {
        let mut balance = 0.0;
        for tx in &self.confirmed {
            if tx.recipient() == address {
                balance += tx.amount();
            }
            if tx.sender() == address && tx.kind() == TransactionKind::Transfer {
                balance -= tx.amount() + tx.fee();
            }
        }
        balance
    }

    /// Pending and confirmed transactions touching an address, most recent
    /// first. A limit of 0 means unlimited.
    pub fn history_for(&self, address: &Address, limit: usize) -> Vec<Transaction> {
        let mut history: Vec<Transaction> = self
            .pending
            .iter()
            .chain(self.confirmed.iter())
            .filter(|tx| tx.touches(address))
            .cloned()
            .collect();

        history.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        if limit > 0 {
            history.truncate(limit);
        }
        history
    }

    /// Rebuilds a pool from persisted state.
    pub(crate) fn restore(pending: Vec<Transaction>, confirmed: Vec<Transaction>) -> Self {
        TransactionPool { pending, confirmed }
    }
}
