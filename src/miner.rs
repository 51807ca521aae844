//! Proof-of-work sealing
//!
//! A block is sealed by searching nonces upward until the SHA-256 of its
//! canonical encoding starts with `difficulty` hex zeros. At difficulty 4 that
//! is about 65 536 attempts on average.

use crate::blockchain::{meets_difficulty, nonce_suffix, preimage_hasher, Block};
use crate::error::{LedgerError, Result};
use serde_json::Value;
use sha2::Digest;
use tracing::debug;

/// Seal a freshly built block. The search is unbounded; it only terminates
/// probabilistically, which is fine at the difficulties this ledger uses.
pub fn seal(index: u64, timestamp: i64, transactions: Value, prev_hash: &str, difficulty: usize) -> Block {
    let block = Block {
        index,
        timestamp,
        transactions,
        prev_hash: prev_hash.to_string(),
        nonce: 0,
        hash: String::new(),
    };
    mine_block(block, difficulty)
}

/// Nonces tried between progress reports.
const ROUND: u64 = 1 << 20;

/// Run the nonce search on `block` starting from nonce 0.
pub fn mine_block(block: Block, difficulty: usize) -> Block {
    let mut start: u64 = 0;
    loop {
        if let Some(sealed) = mine_from(block.clone(), difficulty, start, ROUND) {
            return sealed;
        }
        start = start.wrapping_add(ROUND);
        debug!(index = block.index, difficulty, next_nonce = start, "still mining");
    }
}

/// Bounded search: try at most `max_attempts` nonces beginning at
/// `start_nonce`. Returns `None` when the budget runs out.
pub fn mine_from(mut block: Block, difficulty: usize, start_nonce: u64, max_attempts: u64) -> Option<Block> {
    let base = preimage_hasher(block.timestamp, &block.transactions, &block.prev_hash);
    let mut nonce = start_nonce;
    for attempt in 0..max_attempts {
        let mut hasher = base.clone();
        hasher.update(nonce_suffix(nonce));
        let hash = hex::encode(hasher.finalize());
        if meets_difficulty(&hash, difficulty) {
            debug!(index = block.index, nonce, attempts = attempt + 1, "sealed block");
            block.nonce = nonce;
            block.hash = hash;
            return Some(block);
        }
        nonce = match nonce.checked_add(1) {
            Some(next) => next,
            None => return None,
        };
    }
    None
}

/// [`mine_from`] with the exhausted budget reported as an error.
pub fn mine_with_budget(block: Block, difficulty: usize, start_nonce: u64, max_attempts: u64) -> Result<Block> {
    mine_from(block, difficulty, start_nonce, max_attempts)
        .ok_or(LedgerError::MiningBudgetExhausted { attempts: max_attempts, difficulty })
}

/// Seal on tokio's blocking pool so the async runtime keeps serving other
/// work while the nonce search runs.
pub async fn mine_block_async(block: Block, difficulty: usize) -> Result<Block> {
    Ok(tokio::task::spawn_blocking(move || mine_block(block, difficulty)).await?)
}
