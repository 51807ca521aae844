use crate::miner::seal;
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::block::{Block, DIFFICULTY};

/// Append-only sequence of sealed blocks owned by one entity.
///
/// A chain always holds at least its genesis block; deserialization rejects
/// an empty `blocks` array so [`Chain::tip`] can never fail.
///
/// The chain stores no difficulty of its own: the work target is supplied by
/// the caller and never read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChain")]
pub struct Chain {
    label: String,
    blocks: Vec<Block>,
}

#[derive(Deserialize)]
struct RawChain {
    label: String,
    blocks: Vec<Block>,
}

impl TryFrom<RawChain> for Chain {
    type Error = String;

    fn try_from(raw: RawChain) -> Result<Self, Self::Error> {
        if raw.blocks.is_empty() {
            return Err(format!("chain '{}' has no genesis block", raw.label));
        }
        Ok(Chain { label: raw.label, blocks: raw.blocks })
    }
}

impl Chain {
    /// Create a one-block chain whose genesis links to `parent_hash`, sealed
    /// at `difficulty`. Production chains pass [`DIFFICULTY`].
    pub fn genesis(label: impl Into<String>, parent_hash: &str, difficulty: usize) -> Self {
        let label = label.into();
        let timestamp = chrono::Utc::now().timestamp_millis();
        let genesis = seal(0, timestamp, Payload::genesis(label.clone()).to_value(), parent_hash, difficulty);
        debug!(label = %label, hash = %genesis.hash, "created genesis block");
        Chain { label, blocks: vec![genesis] }
    }

    /// Seal `transactions` onto the end of the chain and return the new block.
    pub fn append(&mut self, transactions: impl Into<Value>) -> &Block {
        self.append_at(transactions, DIFFICULTY)
    }

    /// [`Chain::append`] sealed at an explicit difficulty.
    pub fn append_at(&mut self, transactions: impl Into<Value>, difficulty: usize) -> &Block {
        let tip = self.tip();
        let index = self.blocks.len() as u64;
        let prev_hash = tip.hash.clone();
        // Keep timestamps non-decreasing even if the wall clock steps back.
        let timestamp = chrono::Utc::now().timestamp_millis().max(tip.timestamp);
        let block = seal(index, timestamp, transactions.into(), &prev_hash, difficulty);
        debug!(label = %self.label, index, hash = %block.hash, "appended block");
        self.blocks.push(block);
        self.tip()
    }

    pub fn tip(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn genesis_block(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks whose payload carries `"type": tag`, in append order.
    pub fn blocks_of_type<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.payload_type() == Some(tag))
    }

    #[cfg(test)]
    pub(crate) fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }
}
