use crate::entity::{AnchorSnapshot, Entity, EntityKind, Forest};
use crate::payload::TYPE_GENESIS;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::block::{meets_difficulty, DIFFICULTY};
use super::chain::Chain;

/// First integrity fault found while walking a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainFault {
    NotGenesis,
    IndexMismatch { position: usize, found: u64 },
    HashMismatch { index: u64 },
    InsufficientWork { index: u64 },
    BrokenLink { index: u64 },
}

impl fmt::Display for ChainFault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainFault::NotGenesis => write!(f, "first block is not a genesis block"),
            ChainFault::IndexMismatch { position, found } => {
                write!(f, "block at position {} carries index {}", position, found)
            }
            ChainFault::HashMismatch { index } => write!(f, "block {} hash does not match its contents", index),
            ChainFault::InsufficientWork { index } => write!(f, "block {} hash misses the difficulty target", index),
            ChainFault::BrokenLink { index } => write!(f, "block {} does not link to its predecessor", index),
        }
    }
}

/// Walk `chain` and report the first fault, if any.
///
/// Every block, genesis included, must re-hash to its stored `hash`, carry
/// its position as `index` and meet [`DIFFICULTY`]. Every block after
/// genesis must link to its predecessor's stored `hash`.
pub fn inspect_chain(chain: &Chain) -> Result<(), ChainFault> {
    inspect_chain_at(chain, DIFFICULTY)
}

/// [`inspect_chain`] against an explicit work target. Only chains sealed
/// below production difficulty (tests, benchmarks) need this.
pub fn inspect_chain_at(chain: &Chain, difficulty: usize) -> Result<(), ChainFault> {
    let blocks = chain.blocks();
    if blocks[0].payload_type() != Some(TYPE_GENESIS) {
        return Err(ChainFault::NotGenesis);
    }
    for (position, block) in blocks.iter().enumerate() {
        if block.index != position as u64 {
            return Err(ChainFault::IndexMismatch { position, found: block.index });
        }
        if block.calculate_hash() != block.hash {
            return Err(ChainFault::HashMismatch { index: block.index });
        }
        if !meets_difficulty(&block.hash, difficulty) {
            return Err(ChainFault::InsufficientWork { index: block.index });
        }
        if position > 0 && block.prev_hash != blocks[position - 1].hash {
            return Err(ChainFault::BrokenLink { index: block.index });
        }
    }
    Ok(())
}

pub fn validate_chain(chain: &Chain) -> bool {
    inspect_chain(chain).is_ok()
}

pub fn validate_chain_at(chain: &Chain, difficulty: usize) -> bool {
    inspect_chain_at(chain, difficulty).is_ok()
}

/// How a child chain's genesis link to its parent is judged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMode {
    /// The child must link to a block the parent chain actually contains,
    /// the one recorded at creation when a snapshot is available. Later
    /// parent appends do not break the anchor.
    #[default]
    Snapshot,
    /// The child must link to the parent's current tip. Any append to the
    /// parent breaks every existing child anchor and shows up as a failure.
    LiveTip,
}

impl std::str::FromStr for AnchorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snapshot" => Ok(AnchorMode::Snapshot),
            "live_tip" | "live-tip" => Ok(AnchorMode::LiveTip),
            other => Err(format!("unknown anchor mode '{}'", other)),
        }
    }
}

pub fn validate_anchor(child: &Chain, parent: &Chain, mode: AnchorMode) -> bool {
    let anchor = &child.genesis_block().prev_hash;
    match mode {
        AnchorMode::LiveTip => *anchor == parent.tip().hash,
        AnchorMode::Snapshot => parent.blocks().iter().any(|b| b.hash == *anchor),
    }
}

/// Exact snapshot check: the recorded parent block still exists at the
/// recorded position with the recorded hash, and the child links to it.
pub fn validate_recorded_anchor(child: &Chain, parent: &Chain, snapshot: &AnchorSnapshot) -> bool {
    let recorded = parent.blocks().get(snapshot.parent_index as usize);
    matches!(recorded, Some(block) if block.hash == snapshot.parent_hash)
        && child.genesis_block().prev_hash == snapshot.parent_hash
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    pub chain_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
    /// `None` for root entities, which have nothing to anchor to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_valid: Option<bool>,
}

impl EntityReport {
    pub fn is_valid(&self) -> bool {
        self.chain_valid && self.anchor_valid.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub mode: AnchorMode,
    pub entities: Vec<EntityReport>,
    pub overall: bool,
}

impl ValidationReport {
    pub fn failures(&self) -> impl Iterator<Item = &EntityReport> {
        self.entities.iter().filter(|r| !r.is_valid())
    }

    pub fn get(&self, id: &str) -> Option<&EntityReport> {
        self.entities.iter().find(|r| r.id == id)
    }
}

/// Validate every chain in the forest plus every parent/child anchor.
///
/// Chains are independent, so they are checked in parallel. A child whose
/// parent id is missing fails its anchor check.
pub fn validate_all(forest: &Forest, mode: AnchorMode) -> ValidationReport {
    validate_all_at(forest, mode, DIFFICULTY)
}

/// [`validate_all`] against an explicit work target.
pub fn validate_all_at(forest: &Forest, mode: AnchorMode, difficulty: usize) -> ValidationReport {
    let mut parents: HashMap<(EntityKind, &str), &Entity> = HashMap::new();
    for entity in forest.iter() {
        parents.insert((entity.kind, entity.id.as_str()), entity);
    }

    let all: Vec<&Entity> = forest.iter().collect();
    let entities: Vec<EntityReport> = all
        .par_iter()
        .map(|&entity| {
            let fault = inspect_chain_at(&entity.chain, difficulty).err();
            let anchor_valid = entity.kind.parent().map(|parent_kind| {
                let parent = entity
                    .parent_id
                    .as_deref()
                    .and_then(|pid| parents.get(&(parent_kind, pid)).copied());
                match parent {
                    Some(parent) => anchor_holds(entity, parent, mode),
                    None => false,
                }
            });
            EntityReport {
                kind: entity.kind,
                id: entity.id.clone(),
                name: entity.name.clone(),
                chain_valid: fault.is_none(),
                fault: fault.map(|f| f.to_string()),
                anchor_valid,
            }
        })
        .collect();

    let overall = entities.iter().all(EntityReport::is_valid);
    ValidationReport { mode, entities, overall }
}

fn anchor_holds(child: &Entity, parent: &Entity, mode: AnchorMode) -> bool {
    match (mode, &child.anchor) {
        (AnchorMode::Snapshot, Some(snapshot)) => {
            snapshot.parent_id == parent.id && validate_recorded_anchor(&child.chain, &parent.chain, snapshot)
        }
        _ => validate_anchor(&child.chain, &parent.chain, mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::ROOT_SENTINEL;
    use serde_json::json;

    fn chain_with(n: usize) -> Chain {
        let mut chain = Chain::genesis("Alpha", ROOT_SENTINEL, 1);
        for i in 0..n {
            chain.append_at(json!({"n": i}), 1);
        }
        chain
    }

    fn inspect(chain: &Chain) -> Result<(), ChainFault> {
        inspect_chain_at(chain, 1)
    }

    #[test]
    fn fresh_chain_is_valid() {
        assert!(validate_chain_at(&chain_with(3), 1));
    }

    #[test]
    fn production_chain_is_valid_by_default() {
        let mut chain = Chain::genesis("Alpha", ROOT_SENTINEL, DIFFICULTY);
        chain.append(json!({"x": 1}));
        assert!(validate_chain(&chain));
    }

    #[test]
    fn tampered_payload_is_detected() {
        let mut chain = chain_with(2);
        chain.blocks_mut()[1].transactions = json!({"n": 99});
        assert_eq!(inspect(&chain), Err(ChainFault::HashMismatch { index: 1 }));
        assert!(!validate_chain_at(&chain, 1));
    }

    #[test]
    fn tampered_genesis_is_detected() {
        let mut chain = chain_with(1);
        chain.blocks_mut()[0].transactions = json!({"type": "genesis", "name": "Beta"});
        assert_eq!(inspect(&chain), Err(ChainFault::HashMismatch { index: 0 }));
    }

    #[test]
    fn resealed_tamper_breaks_the_next_link() {
        let mut chain = chain_with(2);
        let forged = crate::miner::seal(1, 5, json!({"n": 99}), &chain.blocks()[0].hash, 1);
        chain.blocks_mut()[1] = forged;
        assert_eq!(inspect(&chain), Err(ChainFault::BrokenLink { index: 2 }));
    }

    #[test]
    fn reordered_blocks_fail_index_check() {
        let mut chain = chain_with(2);
        chain.blocks_mut().swap(1, 2);
        assert_eq!(inspect(&chain), Err(ChainFault::IndexMismatch { position: 1, found: 2 }));
    }

    #[test]
    fn hash_without_work_is_rejected() {
        let mut chain = Chain::genesis("Alpha", ROOT_SENTINEL, 0);
        chain.append_at(json!({"x": 1}), 0);
        assert_eq!(inspect_chain_at(&chain, 64), Err(ChainFault::InsufficientWork { index: 0 }));
    }

    #[test]
    fn stored_difficulty_cannot_lower_the_work_target() {
        let chain = crate::registry::create_root_chain("Alpha");
        let mut doc = serde_json::to_value(&chain).unwrap();
        doc["difficulty"] = json!(0);
        doc["blocks"][0]["transactions"] = json!({"type": "genesis", "name": "Mallory"});
        let mut forged: Chain = serde_json::from_value(doc).unwrap();
        // Re-hash without mining; step past any nonce that happens to meet the target.
        let genesis = &mut forged.blocks_mut()[0];
        genesis.hash = genesis.calculate_hash();
        while meets_difficulty(&genesis.hash, DIFFICULTY) {
            genesis.nonce += 1;
            genesis.hash = genesis.calculate_hash();
        }

        assert!(!validate_chain(&forged));
        assert_eq!(inspect_chain(&forged), Err(ChainFault::InsufficientWork { index: 0 }));
    }

    #[test]
    fn first_block_must_be_genesis() {
        let mut chain = chain_with(0);
        let fake = crate::miner::seal(0, 1, json!({"x": 1}), ROOT_SENTINEL, 1);
        chain.blocks_mut()[0] = fake;
        assert_eq!(inspect(&chain), Err(ChainFault::NotGenesis));
    }

    #[test]
    fn anchor_modes_diverge_after_parent_mutation() {
        let mut parent = chain_with(0);
        let child = Chain::genesis("Child", &parent.tip().hash, 1);
        assert!(validate_anchor(&child, &parent, AnchorMode::LiveTip));
        assert!(validate_anchor(&child, &parent, AnchorMode::Snapshot));

        parent.append_at(json!({"unrelated": true}), 1);
        assert!(!validate_anchor(&child, &parent, AnchorMode::LiveTip));
        assert!(validate_anchor(&child, &parent, AnchorMode::Snapshot));
    }

    #[test]
    fn snapshot_mode_rejects_foreign_anchor() {
        let parent = chain_with(1);
        let child = Chain::genesis("Child", &"a".repeat(64), 1);
        assert!(!validate_anchor(&child, &parent, AnchorMode::Snapshot));
    }

    #[test]
    fn recorded_snapshot_must_match_position_and_hash() {
        let mut parent = chain_with(1);
        let tip = parent.tip().clone();
        let child = Chain::genesis("Child", &tip.hash, 1);
        let snapshot = AnchorSnapshot { parent_id: "p".into(), parent_index: tip.index, parent_hash: tip.hash.clone() };
        assert!(validate_recorded_anchor(&child, &parent, &snapshot));

        parent.append_at(json!({"later": 1}), 1);
        assert!(validate_recorded_anchor(&child, &parent, &snapshot));

        let moved = AnchorSnapshot { parent_index: 0, ..snapshot };
        assert!(!validate_recorded_anchor(&child, &parent, &moved));
    }

    #[test]
    fn anchor_mode_parses_config_spellings() {
        assert_eq!("live_tip".parse::<AnchorMode>(), Ok(AnchorMode::LiveTip));
        assert_eq!("snapshot".parse::<AnchorMode>(), Ok(AnchorMode::Snapshot));
        assert!("latest".parse::<AnchorMode>().is_err());
    }
}
