use crate::blockchain::core::block::Block;
use crate::error::ChainError;
use crate::miner::meets_difficulty;
use std::collections::HashSet;

/// Checks that `block` extends `previous`: next index, matching link hash.
pub fn check_block_link(previous: &Block, block: &Block) -> Result<(), ChainError> {
    if block.index() != previous.index() + 1 {
        return Err(ChainError::InvalidBlock(format!(
            "Expected block index {}, got {}",
            previous.index() + 1,
            block.index()
        )));
    }
    if block.previous_hash() != previous.hash() {
        return Err(ChainError::InvalidBlock(format!(
            "Previous hash {} does not match chain head {}",
            block.previous_hash(),
            previous.hash()
        )));
    }
    Ok(())
}

/// Checks that the stored hash matches a fresh recomputation.
pub fn check_block_integrity(block: &Block) -> Result<(), ChainError> {
    if block.hash() != block.compute_hash() {
        return Err(ChainError::InvalidBlock(
            "Stored hash does not match block contents".to_string(),
        ));
    }
    Ok(())
}

/// Checks the proof-of-work target.
pub fn check_proof_of_work(block: &Block, difficulty: u32) -> Result<(), ChainError> {
    if !meets_difficulty(block.hash(), difficulty) {
        return Err(ChainError::InvalidBlock(format!(
            "Block hash does not meet difficulty target {}",
            difficulty
        )));
    }
    Ok(())
}

/// Rejects a block that carries the same transaction id twice.
pub fn check_no_duplicate_ids(block: &Block) -> Result<(), ChainError> {
    let mut seen = HashSet::new();
    for tx in block.transactions() {
        if let Some(id) = tx.id() {
            if !seen.insert(id) {
                return Err(ChainError::DuplicateTransaction(id.to_string()));
            }
        }
    }
    Ok(())
}
