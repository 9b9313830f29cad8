//! Database persistence layer for TallyChain

use crate::blockchain::{Block, DEFAULT_DIFFICULTY};
use crate::error::ChainError;
use crate::transaction::Transaction;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::sync::Mutex;

/// Everything a backend stores: the block sequence, the difficulty, and the
/// not-yet-mined pending queue (so one-shot tools compose across runs).
#[derive(Debug, Clone, Default)]
pub struct StoredChain {
    pub blocks: Vec<Block>,
    pub difficulty: u32,
    pub pending: Vec<Transaction>,
}

/// Abstraction for persistence backends. Implementations provide atomic
/// saving/loading of the chain snapshot.
pub trait Persistence: Send + Sync {
    /// Atomically stores a newly appended block together with the current
    /// difficulty and pending queue.
    fn save_chain_state(
        &self,
        block: &Block,
        difficulty: u32,
        pending: &[Transaction],
    ) -> Result<(), ChainError>;

    /// Replaces the stored pending queue.
    fn save_pending(&self, pending: &[Transaction]) -> Result<(), ChainError>;

    /// Loads the stored snapshot. An empty backend yields an empty block
    /// list, which callers treat as "create a fresh chain".
    fn load_chain(&self) -> Result<StoredChain, ChainError>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, ChainError> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                height INTEGER PRIMARY KEY,
                hash TEXT NOT NULL,
                previous_hash TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                nonce INTEGER NOT NULL,
                transactions TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create blocks table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS pending (
                position INTEGER PRIMARY KEY,
                data TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            ChainError::DatabaseError(format!("Failed to create pending table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            ChainError::DatabaseError(format!("Failed to create metadata table: {}", e))
        })?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    pub fn save_chain_state(
        &self,
        block: &Block,
        difficulty: u32,
        pending: &[Transaction],
    ) -> Result<(), ChainError> {
        let transactions_json = serde_json::to_string(block.transactions()).map_err(|e| {
            ChainError::DatabaseError(format!("Failed to serialize transactions: {}", e))
        })?;

        let conn_guard = self
            .conn
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        let tx = conn_guard.unchecked_transaction().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to start transaction: {}", e))
        })?;

        tx.execute(
            "INSERT OR REPLACE INTO blocks (height, hash, previous_hash, timestamp, nonce, transactions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                block.index() as i64,
                block.hash(),
                block.previous_hash(),
                block.timestamp() as i64,
                block.nonce() as i64,
                transactions_json,
            ],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to save block: {}", e)))?;

        Self::replace_pending(&tx, pending)?;

        tx.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('difficulty', ?1)",
            params![difficulty.to_string()],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to save difficulty: {}", e)))?;

        tx.commit()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to commit transaction: {}", e)))
    }

    pub fn save_pending(&self, pending: &[Transaction]) -> Result<(), ChainError> {
        let conn_guard = self
            .conn
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        let tx = conn_guard.unchecked_transaction().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to start transaction: {}", e))
        })?;

        Self::replace_pending(&tx, pending)?;

        tx.commit()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to commit transaction: {}", e)))
    }

    fn replace_pending(
        tx: &rusqlite::Transaction<'_>,
        pending: &[Transaction],
    ) -> Result<(), ChainError> {
        tx.execute("DELETE FROM pending", [])
            .map_err(|e| ChainError::DatabaseError(format!("Failed to clear pending: {}", e)))?;

        for (position, transaction) in pending.iter().enumerate() {
            let data = serde_json::to_string(transaction).map_err(|e| {
                ChainError::DatabaseError(format!("Failed to serialize transaction: {}", e))
            })?;
            tx.execute(
                "INSERT INTO pending (position, data) VALUES (?1, ?2)",
                params![position as i64, data],
            )
            .map_err(|e| {
                ChainError::DatabaseError(format!("Failed to save pending transaction: {}", e))
            })?;
        }
        Ok(())
    }

    pub fn load_chain(&self) -> Result<StoredChain, ChainError> {
        let conn_guard = self
            .conn
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;

        let mut stmt = conn_guard
            .prepare(
                "SELECT height, hash, previous_hash, timestamp, nonce, transactions
                 FROM blocks ORDER BY height ASC",
            )
            .map_err(|e| ChainError::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let blocks_iter = stmt
            .query_map([], |row| {
                let height: i64 = row.get(0)?;
                let hash: String = row.get(1)?;
                let previous_hash: String = row.get(2)?;
                let timestamp: i64 = row.get(3)?;
                let nonce: i64 = row.get(4)?;
                let transactions_json: String = row.get(5)?;
                let transactions: Vec<Transaction> = serde_json::from_str(&transactions_json)
                    .map_err(|_e| rusqlite::Error::InvalidQuery)?;

                Ok(Block::from_parts(
                    height as u64,
                    timestamp as u64,
                    transactions,
                    previous_hash,
                    nonce as u64,
                    hash,
                ))
            })
            .map_err(|e| ChainError::DatabaseError(format!("Failed to query blocks: {}", e)))?;

        let mut blocks = Vec::new();
        for block_result in blocks_iter {
            blocks.push(
                block_result
                    .map_err(|e| ChainError::DatabaseError(format!("Failed to load block: {}", e)))?,
            );
        }

        let mut stmt = conn_guard
            .prepare("SELECT data FROM pending ORDER BY position ASC")
            .map_err(|e| ChainError::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let pending_iter = stmt
            .query_map([], |row| {
                let data: String = row.get(0)?;
                serde_json::from_str::<Transaction>(&data)
                    .map_err(|_e| rusqlite::Error::InvalidQuery)
            })
            .map_err(|e| ChainError::DatabaseError(format!("Failed to query pending: {}", e)))?;

        let mut pending = Vec::new();
        for tx_result in pending_iter {
            pending.push(tx_result.map_err(|e| {
                ChainError::DatabaseError(format!("Failed to load pending transaction: {}", e))
            })?);
        }

        let difficulty: u32 = conn_guard
            .query_row(
                "SELECT value FROM metadata WHERE key = 'difficulty'",
                [],
                |row| {
                    let value: String = row.get(0)?;
                    Ok(value.parse::<u32>().unwrap_or(DEFAULT_DIFFICULTY))
                },
            )
            .unwrap_or(DEFAULT_DIFFICULTY);

        Ok(StoredChain {
            blocks,
            difficulty,
            pending,
        })
    }
}

// Implement the Persistence trait for the rusqlite-backed Database
impl Persistence for Database {
    fn save_chain_state(
        &self,
        block: &Block,
        difficulty: u32,
        pending: &[Transaction],
    ) -> Result<(), ChainError> {
        Database::save_chain_state(self, block, difficulty, pending)
    }

    fn save_pending(&self, pending: &[Transaction]) -> Result<(), ChainError> {
        Database::save_pending(self, pending)
    }

    fn load_chain(&self) -> Result<StoredChain, ChainError> {
        Database::load_chain(self)
    }
}

/// Simple in-memory persistence implementation useful for tests and
/// ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    blocks: std::sync::Arc<Mutex<HashMap<u64, Block>>>,
    pending: std::sync::Arc<Mutex<Vec<Transaction>>>,
    difficulty: std::sync::Arc<Mutex<u32>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn save_chain_state(
        &self,
        block: &Block,
        difficulty: u32,
        pending: &[Transaction],
    ) -> Result<(), ChainError> {
        let mut blocks = self
            .blocks
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        blocks.insert(block.index(), block.clone());

        self.save_pending(pending)?;

        let mut diff = self
            .difficulty
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        *diff = difficulty;

        Ok(())
    }

    fn save_pending(&self, pending: &[Transaction]) -> Result<(), ChainError> {
        let mut stored = self
            .pending
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        *stored = pending.to_vec();
        Ok(())
    }

    fn load_chain(&self) -> Result<StoredChain, ChainError> {
        let blocks_guard = self
            .blocks
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        let mut blocks: Vec<Block> = blocks_guard.values().cloned().collect();
        blocks.sort_by_key(|b| b.index());

        let pending = self
            .pending
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?
            .clone();
        let difficulty = *self
            .difficulty
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;

        Ok(StoredChain {
            blocks,
            difficulty: if difficulty == 0 {
                DEFAULT_DIFFICULTY
            } else {
                difficulty
            },
            pending,
        })
    }
}
