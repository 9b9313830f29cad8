use crate::crypto;
use crate::transaction::types::now_millis;
use crate::transaction::Transaction;
use serde_json::json;

/// Fixed genesis timestamp so every node derives the same chain root.
pub const GENESIS_TIMESTAMP: u64 = 1_672_531_200_000;

/// The genesis block links to this sentinel instead of a real hash.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// A hash-linked container of transactions. Fields are private: after a
/// block is built only the nonce may change (during mining, through
/// [`Block::advance_nonce`], which rehashes immediately), so the stored hash
/// always matches the content.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Block {
    index: u64,
    timestamp: u64,
    transactions: Vec<Transaction>,
    previous_hash: String,
    nonce: u64,
    hash: String,
}

impl Block {
    /// Builds a block with nonce 0 and its hash computed immediately.
    /// The timestamp defaults to the current time.
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: String,
        timestamp: Option<u64>,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp: timestamp.unwrap_or_else(now_millis),
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// The unmined chain root: index 0, no transactions, previous hash "0".
    pub fn genesis() -> Self {
        Block::new(
            0,
            Vec::new(),
            GENESIS_PREVIOUS_HASH.to_string(),
            Some(GENESIS_TIMESTAMP),
        )
    }

    /// Canonical sorted-key hash over index, timestamp, transactions,
    /// previous hash and nonce. The stored hash itself is excluded.
    pub fn compute_hash(&self) -> String {
        let record = json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "transactions": self
                .transactions
                .iter()
                .map(|tx| tx.canonical_record())
                .collect::<Vec<_>>(),
            "previous_hash": self.previous_hash,
            "nonce": self.nonce,
        });
        crypto::content_hash(record.to_string().as_bytes())
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Increments the nonce and rehashes. Only the miner calls this.
    pub(crate) fn advance_nonce(&mut self) {
        self.nonce += 1;
        self.hash = self.compute_hash();
    }

    /// Reassembles a block from persisted columns. The stored hash is taken
    /// as-is; `is_chain_valid` recomputes it when integrity matters.
    pub(crate) fn from_parts(
        index: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
        previous_hash: String,
        nonce: u64,
        hash: String,
    ) -> Self {
        Block {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce,
            hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_genesis_block_shape() {
        let genesis = Block::genesis();
        assert_eq!(genesis.index(), 0);
        assert_eq!(genesis.previous_hash(), GENESIS_PREVIOUS_HASH);
        assert!(genesis.transactions().is_empty());
        assert_eq!(genesis.nonce(), 0);
        assert_eq!(genesis.hash(), genesis.compute_hash());

        // Deterministic: two genesis blocks are the same block
        assert_eq!(genesis.hash(), Block::genesis().hash());
    }

    #[test]
    fn test_hash_tracks_nonce() {
        let mut block = Block::new(1, Vec::new(), "0".repeat(64), Some(1_700_000_000_000));
        let initial = block.hash().to_string();

        block.advance_nonce();
        assert_eq!(block.nonce(), 1);
        assert_ne!(block.hash(), initial);
        assert_eq!(block.hash(), block.compute_hash());
    }

    #[test]
    fn test_hash_commits_to_transactions() {
        let recipient = KeyPair::generate().unwrap().address();
        let mint = Transaction::mint(recipient, 10.0, "Mining reward");
        let timestamp = Some(1_700_000_000_000);

        let empty = Block::new(1, Vec::new(), "0".repeat(64), timestamp);
        let with_tx = Block::new(1, vec![mint], "0".repeat(64), timestamp);
        assert_ne!(empty.hash(), with_tx.hash());
    }
}
