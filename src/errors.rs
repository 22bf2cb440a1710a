//! Error types for the round engine and the node around it
//!
//! Every rejection of a game operation is a distinct `RoundError` variant so
//! callers can tell conditions apart. Infrastructure failures are grouped by
//! category and folded into `NodeError`.

use crate::types::{Address, Amount, BlockNumber, RoundId};

/// Rejections of game operations. State is unchanged whenever one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoundError {
    #[error("Invalid bet amount {amount}: must be between {min} and {max}")]
    InvalidBetAmount { amount: Amount, min: Amount, max: Amount },

    #[error("Player {player} already played in round {round}")]
    AlreadyPlayed { round: RoundId, player: Address },

    #[error("Betting closed for round {round}: target block {target_block}, current block {current_block}")]
    BettingClosed {
        round: RoundId,
        target_block: BlockNumber,
        current_block: BlockNumber,
    },

    #[error("Round {round} is not active")]
    RoundNotActive { round: RoundId },

    #[error("Round {round} already finalized")]
    RoundAlreadyFinalized { round: RoundId },

    #[error("Cannot finalize round {round} yet: target block {target_block}, current block {current_block}")]
    CannotFinalizeYet {
        round: RoundId,
        target_block: BlockNumber,
        current_block: BlockNumber,
    },

    #[error("Blockhash of target block {target_block} for round {round} is no longer available at block {current_block}; use emergency finalize")]
    BlockhashUnavailable {
        round: RoundId,
        target_block: BlockNumber,
        current_block: BlockNumber,
    },

    #[error("Payout failed for round {round}: {reason}")]
    PayoutFailed {
        round: RoundId,
        recipient: Option<Address>,
        reason: String,
    },

    #[error("Deposit of {amount} from {player} rejected: {reason}")]
    DepositRejected {
        player: Address,
        amount: Amount,
        reason: String,
    },
}

impl RoundError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RoundError::InvalidBetAmount { .. } => "INVALID_BET_AMOUNT",
            RoundError::AlreadyPlayed { .. } => "ALREADY_PLAYED",
            RoundError::BettingClosed { .. } => "BETTING_CLOSED",
            RoundError::RoundNotActive { .. } => "ROUND_NOT_ACTIVE",
            RoundError::RoundAlreadyFinalized { .. } => "ROUND_ALREADY_FINALIZED",
            RoundError::CannotFinalizeYet { .. } => "CANNOT_FINALIZE_YET",
            RoundError::BlockhashUnavailable { .. } => "BLOCKHASH_UNAVAILABLE",
            RoundError::PayoutFailed { .. } => "PAYOUT_FAILED",
            RoundError::DepositRejected { .. } => "DEPOSIT_REJECTED",
        }
    }
}

/// Configuration loading and validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
}

/// Storage system errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

/// Root error type for node operations
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("Round error: {0}")]
    Round(#[from] RoundError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for NodeError {
    fn from(e: rocksdb::Error) -> Self {
        NodeError::Storage(StorageError::WriteFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::CorruptedData(e.to_string())
    }
}

// Convenience type alias for Results
pub type NodeResult<T> = Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_round_error_display() {
        let err = RoundError::CannotFinalizeYet {
            round: 3,
            target_block: 10,
            current_block: 7,
        };
        let text = err.to_string();
        assert!(text.contains("round 3"));
        assert!(text.contains("target block 10"));
        assert!(text.contains("current block 7"));
    }

    #[test]
    fn test_round_error_codes_are_distinct() {
        let player = Address::repeat_byte(1);
        let errors = vec![
            RoundError::InvalidBetAmount { amount: 1, min: 2, max: 3 },
            RoundError::AlreadyPlayed { round: 1, player },
            RoundError::BettingClosed { round: 1, target_block: 1, current_block: 1 },
            RoundError::RoundNotActive { round: 1 },
            RoundError::RoundAlreadyFinalized { round: 1 },
            RoundError::CannotFinalizeYet { round: 1, target_block: 1, current_block: 0 },
            RoundError::BlockhashUnavailable { round: 1, target_block: 1, current_block: 300 },
            RoundError::PayoutFailed { round: 1, recipient: None, reason: "x".into() },
            RoundError::DepositRejected { player, amount: 1, reason: "x".into() },
        ];

        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_error_conversion() {
        let node_error: NodeError = RoundError::RoundNotActive { round: 9 }.into();
        match node_error {
            NodeError::Round(RoundError::RoundNotActive { round }) => assert_eq!(round, 9),
            other => panic!("Expected round error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_source() {
        let node_error: NodeError = StorageError::ReadFailed("disk".into()).into();
        assert!(node_error.source().is_some());
        assert!(node_error.to_string().contains("Storage error"));
    }
}
