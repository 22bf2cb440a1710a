//! Blockhash Guess - round-based guessing game settled by a future block hash
//!
//! Players wager an amount inside a fixed range; the wager is also their guess.
//! Each round commits to a target block a few blocks ahead. Once that block is
//! produced its hash determines the winning value, everyone who guessed it
//! splits the jackpot evenly, and the next round opens in the same step. A
//! round with no winner burns its jackpot.
//!
//! The crate is layered bottom-up:
//! - `types`, `chain`, `randomness`: identities, block history and the
//!   winning-value derivation
//! - `ledger`, `settlement`, `events`: round storage, custody of funds and
//!   the observable event journal
//! - `engine`: the round state machine tying those together
//! - `service`, `round_store`, `producer`, `api`: the node around it

pub mod api;
pub mod chain;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod history;
pub mod ledger;
pub mod metrics;
pub mod producer;
pub mod randomness;
pub mod round_store;
pub mod service;
pub mod settlement;
pub mod storage;
pub mod types;

pub use chain::{BlockContext, ChainView, SimulatedChain};
pub use config::{ConfigLoader, GameRules, NodeConfig};
pub use engine::{BetReceipt, FinalizeOutcome, GameState, RoundEngine};
pub use errors::{NodeError, NodeResult, RoundError};
pub use events::{EventJournal, EventRecord, GameEvent};
pub use ledger::{Bet, FinalizationPath, Round, RoundLedger};
pub use randomness::{BlockhashRandomness, RandomnessSource};
pub use service::GameService;
pub use settlement::{CustodyVault, DustPolicy, SettlementExecutor, SettlementPlan};
pub use types::{Address, Amount, BetRange, BlockHash, BlockNumber, RoundId};
