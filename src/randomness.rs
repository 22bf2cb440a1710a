//! Winning value derivation
//!
//! The winning value of a round is a pure function of a 32-byte seed and the
//! round id. On the normal path the seed is the target block's hash, fixed
//! once that block exists, so choosing when to call finalize cannot change
//! the outcome. The emergency path seeds from the finalizing block itself.

use crate::chain::BlockContext;
use crate::types::{Amount, BetRange, BlockHash, RoundId};
use sha2::{Digest, Sha256};

const EMERGENCY_DOMAIN: &[u8] = b"emergency";

/// Source of winning values
pub trait RandomnessSource: Send + Sync {
    /// Map `seed` and `round_id` onto a value in `[range.min_bet(), range.max_bet()]`
    fn winning_value(&self, seed: &BlockHash, round_id: RoundId, range: &BetRange) -> Amount;
}

/// SHA-256 over `seed || round_id`, reduced modulo the guess span
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockhashRandomness;

impl BlockhashRandomness {
    pub fn new() -> Self {
        Self
    }

    /// Raw 256-bit digest mixing the seed with the round id
    pub fn mix(seed: &BlockHash, round_id: RoundId) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(round_id.to_be_bytes());
        hasher.finalize().into()
    }
}

impl RandomnessSource for BlockhashRandomness {
    fn winning_value(&self, seed: &BlockHash, round_id: RoundId, range: &BetRange) -> Amount {
        let digest = Self::mix(seed, round_id);
        let offset = reduce_be(&digest, range.span());
        range.scale(range.min_guess + offset)
    }
}

/// Big-endian 256-bit integer modulo `modulus`
fn reduce_be(bytes: &[u8; 32], modulus: u64) -> u64 {
    let m = modulus as u128;
    let mut acc: u128 = 0;
    for byte in bytes {
        acc = ((acc << 8) | *byte as u128) % m;
    }
    acc as u64
}

/// Fallback seed for rounds whose target hash has expired.
/// Only depends on the block the emergency finalization executes in.
pub fn emergency_seed(block: &BlockContext) -> BlockHash {
    let mut hasher = Sha256::new();
    hasher.update(EMERGENCY_DOMAIN);
    hasher.update(block.hash);
    hasher.update(block.number.to_be_bytes());
    hasher.update(block.timestamp.to_be_bytes());
    hasher.finalize().into()
}

/// Always returns the same whole-unit guess. Test support.
#[derive(Clone, Copy, Debug)]
pub struct FixedRandomness {
    pub guess: u64,
}

impl FixedRandomness {
    pub fn new(guess: u64) -> Self {
        Self { guess }
    }
}

impl RandomnessSource for FixedRandomness {
    fn winning_value(&self, _seed: &BlockHash, _round_id: RoundId, range: &BetRange) -> Amount {
        range.scale(self.guess.clamp(range.min_guess, range.max_guess))
    }
}
