//! Single-owner access to a running ledger.
//!
//! The chain is one mutable resource. `ChainHandle` protects it with one
//! exclusive lock and every operation holds that lock for its whole
//! duration, so submissions and mining never interleave their
//! read-modify-write of the pending queue, and two concurrent submissions of
//! the same transaction settle to exactly one pending entry.

use crate::blockchain::{Blockchain, ChainInfo, MiningOutcome, TxLocation};
use crate::crypto::Address;
use crate::error::ChainError;
use crate::transaction::Transaction;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation for the proof-of-work search. Cloning shares the
/// flag, so one side can mine while the other cancels.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct ChainHandle {
    chain: Arc<Mutex<Blockchain>>,
}

impl ChainHandle {
    pub fn new(chain: Blockchain) -> Self {
        ChainHandle {
            chain: Arc::new(Mutex::new(chain)),
        }
    }

    pub fn submit_transaction(&self, transaction: Transaction) -> Result<String, ChainError> {
        self.chain.lock().add_transaction(transaction)
    }

    pub fn mine(&self, reward_address: &Address) -> Result<MiningOutcome, ChainError> {
        self.chain.lock().mine_pending_transactions(reward_address)
    }

    /// Mines while holding the lock; the flag is independent of the lock, so
    /// another thread can cancel a search in progress.
    pub fn mine_with_cancel(
        &self,
        reward_address: &Address,
        cancel: &CancelFlag,
    ) -> Result<MiningOutcome, ChainError> {
        self.chain
            .lock()
            .mine_with_cancel(reward_address, Some(&cancel.0))
    }

    pub fn balance(&self, address: &Address) -> f64 {
        self.chain.lock().get_balance(address)
    }

    pub fn history(&self, address: &Address, limit: usize) -> Vec<Transaction> {
        self.chain.lock().get_transaction_history(address, limit)
    }

    pub fn search(&self, transaction_id: &str) -> (Option<Transaction>, TxLocation) {
        let chain = self.chain.lock();
        let (tx, location) = chain.search_transaction(transaction_id);
        (tx.cloned(), location)
    }

    pub fn info(&self) -> ChainInfo {
        self.chain.lock().info()
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        self.chain.lock().is_chain_valid()
    }
}
