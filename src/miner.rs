//! Proof-of-work search for TallyChain

use crate::blockchain::Block;
use std::sync::atomic::{AtomicBool, Ordering};

/// How often mining progress is logged, in hash attempts.
const PROGRESS_INTERVAL: u64 = 100_000;

/// True if the hex hash starts with `difficulty` zero digits.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let prefix_len = difficulty as usize;
    hash.len() >= prefix_len && hash.bytes().take(prefix_len).all(|b| b == b'0')
}

/// Brute-force search for a nonce that puts the block hash under the
/// difficulty target. The search is CPU-bound and unbounded, so callers that
/// cannot block indefinitely pass a cancellation flag; a cancelled search
/// returns `None` and the caller discards the in-progress block.
pub fn mine_block(mut block: Block, difficulty: u32, cancel: Option<&AtomicBool>) -> Option<Block> {
    let mut attempts: u64 = 0;

    while !meets_difficulty(block.hash(), difficulty) {
        if let Some(flag) = cancel {
            if flag.load(Ordering::Relaxed) {
                log::info!(
                    "Mining of block {} cancelled after {} attempts",
                    block.index(),
                    attempts
                );
                return None;
            }
        }

        block.advance_nonce();
        attempts += 1;
        if attempts % PROGRESS_INTERVAL == 0 {
            log::debug!("Mining block {}: {} attempts", block.index(), attempts);
        }
    }

    log::info!(
        "Block {} mined: nonce {}, hash {}",
        block.index(),
        block.nonce(),
        block.hash()
    );
    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Block;

    fn test_block() -> Block {
        Block::new(1, Vec::new(), "0".repeat(64), Some(1_700_000_000_000))
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ab", 2));
        assert!(meets_difficulty("00ab", 0));
        assert!(!meets_difficulty("0a0b", 2));
        assert!(!meets_difficulty("0", 2));
    }

    #[test]
    fn test_mining_satisfies_target() {
        let mined = mine_block(test_block(), 2, None).unwrap();
        assert!(mined.hash().starts_with("00"));
        assert_eq!(mined.hash(), mined.compute_hash());
    }

    #[test]
    fn test_cancelled_mining_returns_none() {
        let flag = AtomicBool::new(true);
        // A 64-digit zero prefix is unreachable, so only cancellation can
        // end this search.
        assert!(mine_block(test_block(), 64, Some(&flag)).is_none());
    }
}
