//! Block history the engine reads from
//!
//! `ChainView` exposes the current block and the hashes of recent blocks.
//! `SimulatedChain` is the in-process chain used by the node and by tests:
//! each block hash commits to its parent, height and timestamp, and only the
//! most recent `window` hashes stay retrievable.

use crate::types::{BlockHash, BlockNumber};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

/// Header of a produced block
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    pub number: BlockNumber,
    #[serde(with = "hex_hash")]
    pub hash: BlockHash,
    #[serde(with = "hex_hash")]
    pub parent_hash: BlockHash,
    /// Unix seconds
    pub timestamp: u64,
}

impl BlockContext {
    fn child(&self, timestamp: u64) -> Self {
        let number = self.number + 1;
        Self {
            number,
            hash: calculate_hash(number, &self.hash, timestamp),
            parent_hash: self.hash,
            timestamp,
        }
    }
}

/// Read access to chain state
pub trait ChainView {
    /// Latest produced block
    fn current_block(&self) -> BlockContext;

    /// Hash of block `number`, if it is still inside the retrievable window
    fn block_hash(&self, number: BlockNumber) -> Option<BlockHash>;

    fn current_number(&self) -> BlockNumber {
        self.current_block().number
    }
}

fn calculate_hash(number: BlockNumber, parent: &BlockHash, timestamp: u64) -> BlockHash {
    let mut hasher = Sha256::new();
    hasher.update(number.to_be_bytes());
    hasher.update(parent);
    hasher.update(timestamp.to_be_bytes());
    hasher.finalize().into()
}

/// In-process chain keeping a bounded window of recent blocks
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulatedChain {
    window: usize,
    head: BlockContext,
    /// Retrievable blocks, oldest first, ending with `head`
    recent: VecDeque<BlockContext>,
}

impl SimulatedChain {
    /// Start a chain at height 0 whose genesis hash is derived from `seed`
    pub fn genesis(seed: &[u8], timestamp: u64, window: usize) -> Self {
        let parent: BlockHash = Sha256::digest(seed).into();
        let genesis = BlockContext {
            number: 0,
            hash: calculate_hash(0, &parent, timestamp),
            parent_hash: parent,
            timestamp,
        };
        let mut recent = VecDeque::with_capacity(window.max(1));
        recent.push_back(genesis);
        Self {
            window: window.max(1),
            head: genesis,
            recent,
        }
    }

    pub fn head(&self) -> &BlockContext {
        &self.head
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Append one block with the given timestamp
    pub fn produce_block(&mut self, timestamp: u64) -> BlockContext {
        let next = self.head.child(timestamp);
        self.head = next;
        self.recent.push_back(next);
        while self.recent.len() > self.window {
            self.recent.pop_front();
        }
        next
    }

    /// Append `count` blocks, each `block_time_secs` after its parent
    pub fn mine(&mut self, count: u64, block_time_secs: u64) -> BlockContext {
        let mut last = *self.head();
        for _ in 0..count {
            let timestamp = last.timestamp + block_time_secs;
            last = self.produce_block(timestamp);
        }
        last
    }

    /// Oldest block whose hash is still retrievable
    pub fn oldest_retrievable(&self) -> BlockNumber {
        self.recent.front().map(|b| b.number).unwrap_or(self.head.number)
    }
}

impl ChainView for SimulatedChain {
    fn current_block(&self) -> BlockContext {
        *self.head()
    }

    fn block_hash(&self, number: BlockNumber) -> Option<BlockHash> {
        let oldest = self.oldest_retrievable();
        if number < oldest || number > self.head.number {
            return None;
        }
        self.recent.get((number - oldest) as usize).map(|b| b.hash)
    }
}

mod hex_hash {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("block hash must be 32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_is_deterministic() {
        let a = SimulatedChain::genesis(b"seed", 1_000, 256);
        let b = SimulatedChain::genesis(b"seed", 1_000, 256);
        let c = SimulatedChain::genesis(b"other", 1_000, 256);
        assert_eq!(a.head(), b.head());
        assert_ne!(a.head().hash, c.head().hash);
        assert_eq!(a.current_number(), 0);
    }

    #[test]
    fn test_blocks_link_to_parent() {
        let mut chain = SimulatedChain::genesis(b"seed", 1_000, 256);
        let genesis = *chain.head();
        let next = chain.mine(1, 12);
        assert_eq!(next.number, 1);
        assert_eq!(next.parent_hash, genesis.hash);
        assert_eq!(next.timestamp, 1_012);
        assert_ne!(next.hash, genesis.hash);
    }

    #[test]
    fn test_window_evicts_old_hashes() {
        let mut chain = SimulatedChain::genesis(b"seed", 0, 256);
        let target = chain.mine(5, 1);
        assert_eq!(chain.block_hash(5), Some(target.hash));

        // Target still retrievable while current - target < 256
        chain.mine(255, 1);
        assert_eq!(chain.current_number(), 260);
        assert_eq!(chain.block_hash(5), Some(target.hash));

        chain.mine(1, 1);
        assert_eq!(chain.block_hash(5), None);
        assert_eq!(chain.oldest_retrievable(), 6);
    }

    #[test]
    fn test_future_block_has_no_hash() {
        let chain = SimulatedChain::genesis(b"seed", 0, 256);
        assert!(chain.block_hash(1).is_none());
        assert!(chain.block_hash(0).is_some());
    }

    #[test]
    fn test_chain_serde_roundtrip_keeps_head() {
        let mut chain = SimulatedChain::genesis(b"seed", 0, 8);
        chain.mine(20, 3);
        let json = serde_json::to_string(&chain).unwrap();
        let restored: SimulatedChain = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.head(), chain.head());
        assert_eq!(restored.oldest_retrievable(), chain.oldest_retrievable());
    }
}
