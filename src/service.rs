//! Game service
//!
//! Owns the round engine and the chain behind one lock, so bets, finalizations
//! and produced blocks are totally ordered no matter how many HTTP handlers or
//! background tasks call in. Every successful mutation is written to storage
//! before the lock is released, and a mutation whose write fails is undone.

use crate::{
    chain::{BlockContext, ChainView, SimulatedChain},
    config::NodeConfig,
    engine::{BetReceipt, EngineCheckpoint, FinalizeOutcome, GameState, RoundEngine},
    errors::{ConfigurationError, NodeError, NodeResult, RoundError, StorageError},
    events::EventRecord,
    ledger::{Bet, Round},
    metrics::GameMetrics,
    randomness::BlockhashRandomness,
    round_store::{self, ChangeSet},
    settlement::CustodyVault,
    storage::OptimizedStorage,
    types::{Address, Amount, RoundId},
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type NodeEngine = RoundEngine<BlockhashRandomness, CustodyVault>;

/// Engine and chain, always locked together
pub struct NodeState {
    pub engine: NodeEngine,
    pub chain: SimulatedChain,
}

/// Game limits a client needs to render
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GameConstants {
    pub min_bet: Amount,
    pub max_bet: Amount,
    pub blocks_to_wait: u64,
    pub blockhash_window: u64,
    pub unit: Amount,
}

/// A player's participation in one round
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlayerEntry {
    pub round: RoundId,
    pub player: Address,
    pub has_played: bool,
    pub amount: Amount,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FinalizeKind {
    Normal,
    Emergency,
}

/// In-memory state to return to when a write fails
struct Checkpoint {
    engine: EngineCheckpoint<CustodyVault>,
    chain: Option<SimulatedChain>,
}

#[derive(Clone)]
pub struct GameService {
    state: Arc<Mutex<NodeState>>,
    storage: Option<OptimizedStorage>,
    metrics: GameMetrics,
    config: Arc<NodeConfig>,
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

impl GameService {
    /// Open storage per `config`, resume stored state or initialize round 1
    pub fn start(config: NodeConfig) -> NodeResult<Self> {
        config.validate()?;

        let storage = if config.storage.enabled {
            let storage =
                OptimizedStorage::open_with_reset(&config.storage.data_directory, config.storage.clear_on_start)
                    .map_err(|e| NodeError::Storage(StorageError::DatabaseOpenFailed(e.to_string())))?;
            Some(storage)
        } else {
            None
        };

        let restored = match &storage {
            Some(storage) => round_store::load_state(storage)?,
            None => None,
        };

        let state = match restored {
            Some(persisted) => NodeState {
                engine: RoundEngine::restore(
                    config.game.clone(),
                    persisted.ledger,
                    persisted.journal,
                    BlockhashRandomness::new(),
                    persisted.vault,
                ),
                chain: persisted.chain,
            },
            None => {
                let chain = SimulatedChain::genesis(
                    config.chain.genesis_seed.as_bytes(),
                    unix_now(),
                    config.game.blockhash_window as usize,
                );
                let engine = RoundEngine::new(config.game.clone(), &chain, BlockhashRandomness::new(), CustodyVault::new());
                if let Some(storage) = &storage {
                    round_store::persist_all(
                        storage,
                        engine.ledger(),
                        engine.journal(),
                        &chain,
                        engine.executor(),
                    )?;
                }
                NodeState { engine, chain }
            }
        };

        Self::from_state(config, state, storage)
    }

    /// Wrap an already-built state. Nothing is written until the next mutation.
    pub fn from_state(config: NodeConfig, state: NodeState, storage: Option<OptimizedStorage>) -> NodeResult<Self> {
        let metrics = GameMetrics::new()
            .map_err(|e| NodeError::Configuration(ConfigurationError::LoadFailed(e.to_string())))?;
        let service = Self {
            state: Arc::new(Mutex::new(state)),
            storage,
            metrics,
            config: Arc::new(config),
        };
        Ok(service)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn metrics(&self) -> &GameMetrics {
        &self.metrics
    }

    /// Run `f` with exclusive access to engine and chain. Changes made here are not persisted.
    pub async fn with_state<T>(&self, f: impl FnOnce(&mut NodeState) -> T) -> T {
        let mut state = self.state.lock().await;
        f(&mut state)
    }

    fn refresh_gauges(&self, state: &NodeState) {
        let range = state.engine.rules().bet_range();
        self.metrics
            .set_round(state.engine.current_round(), range.to_units(state.engine.jackpot()));
        self.metrics.set_block_height(state.chain.current_number());
    }

    /// Persist the given rounds, events from `from_sequence` on, the vault and optionally the chain
    fn persist(&self, state: &NodeState, rounds: &[RoundId], from_sequence: u64, with_chain: bool) -> NodeResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        let engine = &state.engine;
        let changes = ChangeSet {
            rounds: rounds.iter().filter_map(|id| engine.round(*id)).collect(),
            cursor: Some(engine.current_round()),
            events: engine.events(from_sequence),
            chain: with_chain.then_some(&state.chain),
            vault: Some(engine.executor()),
        };
        round_store::persist(storage, &changes)
    }

    fn checkpoint(&self, state: &NodeState, with_chain: bool) -> Option<Checkpoint> {
        if self.storage.is_none() {
            return None;
        }
        Some(Checkpoint {
            engine: state.engine.checkpoint(),
            chain: with_chain.then(|| state.chain.clone()),
        })
    }

    /// Persist one mutation. If the write fails the mutation is undone in
    /// memory, so the node never runs ahead of its storage.
    fn commit(
        &self,
        state: &mut NodeState,
        checkpoint: Option<Checkpoint>,
        rounds: &[RoundId],
        from_sequence: u64,
        with_chain: bool,
    ) -> NodeResult<()> {
        let Err(e) = self.persist(state, rounds, from_sequence, with_chain) else {
            return Ok(());
        };
        tracing::error!("Failed to persist state: {}", e);
        if let Some(checkpoint) = checkpoint {
            state.engine.rollback(checkpoint.engine);
            if let Some(chain) = checkpoint.chain {
                state.chain = chain;
            }
        }
        Err(e)
    }

    pub async fn submit_bet(&self, player: Address, amount: Amount) -> NodeResult<BetReceipt> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let from_sequence = state.engine.journal().next_sequence();
        let checkpoint = self.checkpoint(state, false);

        let receipt = match state.engine.submit_bet(player, amount, &state.chain) {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::debug!("Bet from {} rejected: {}", player, e);
                self.metrics.record_rejection(&e);
                return Err(e.into());
            }
        };
        self.commit(state, checkpoint, &[receipt.round], from_sequence, false)?;
        self.metrics.record_bet();
        self.refresh_gauges(state);
        Ok(receipt)
    }

    /// Finalize `round`, or the round an id-less call refers to when `None`
    pub async fn finalize(&self, round: Option<RoundId>) -> NodeResult<FinalizeOutcome> {
        let mut guard = self.state.lock().await;
        self.finalize_locked(&mut guard, round, FinalizeKind::Normal)
    }

    pub async fn emergency_finalize(&self, round: Option<RoundId>) -> NodeResult<FinalizeOutcome> {
        let mut guard = self.state.lock().await;
        self.finalize_locked(&mut guard, round, FinalizeKind::Emergency)
    }

    fn finalize_locked(
        &self,
        state: &mut NodeState,
        round: Option<RoundId>,
        kind: FinalizeKind,
    ) -> NodeResult<FinalizeOutcome> {
        let round = round.unwrap_or_else(|| state.engine.implicit_round(&state.chain));
        let from_sequence = state.engine.journal().next_sequence();
        let checkpoint = self.checkpoint(state, false);

        let outcome = self.run_finalize(state, round, kind)?;
        self.commit(state, checkpoint, &[outcome.round, outcome.next_round], from_sequence, false)?;
        self.metrics
            .record_finalization(outcome.path, outcome.winners.is_empty());
        self.refresh_gauges(state);
        Ok(outcome)
    }

    fn run_finalize(&self, state: &mut NodeState, round: RoundId, kind: FinalizeKind) -> Result<FinalizeOutcome, RoundError> {
        let result = match kind {
            FinalizeKind::Normal => state.engine.finalize_round(round, &state.chain),
            FinalizeKind::Emergency => state.engine.emergency_finalize_round(round, &state.chain),
        };
        if let Err(RoundError::PayoutFailed { .. }) = &result {
            self.metrics.record_payout_failure();
        }
        result
    }

    /// Append one block stamped with the wall clock and run the finalization keeper
    pub async fn produce_block(&self) -> NodeResult<BlockContext> {
        let mut guard = self.state.lock().await;
        let checkpoint = self.checkpoint(&guard, true);
        let timestamp = unix_now().max(guard.chain.head().timestamp);
        let block = guard.chain.produce_block(timestamp);
        self.after_blocks(&mut guard, checkpoint)?;
        Ok(block)
    }

    /// Append `count` blocks spaced by `block_time_secs`
    pub async fn advance_blocks(&self, count: u64) -> NodeResult<BlockContext> {
        let mut guard = self.state.lock().await;
        let checkpoint = self.checkpoint(&guard, true);
        let block = guard.chain.mine(count, self.config.chain.block_time_secs);
        self.after_blocks(&mut guard, checkpoint)?;
        Ok(block)
    }

    fn after_blocks(&self, state: &mut NodeState, checkpoint: Option<Checkpoint>) -> NodeResult<()> {
        let from_sequence = state.engine.journal().next_sequence();
        let mut finalized = None;

        if self.config.chain.auto_finalize && state.engine.can_finalize(&state.chain) {
            let kind = if state.engine.emergency_required(&state.chain) {
                FinalizeKind::Emergency
            } else {
                FinalizeKind::Normal
            };
            let round = state.engine.current_round();
            match self.run_finalize(state, round, kind) {
                Ok(outcome) => finalized = Some(outcome),
                Err(e) => tracing::warn!("Automatic finalization of round {} failed: {}", round, e),
            }
        }

        let touched: Vec<RoundId> = finalized
            .iter()
            .flat_map(|outcome| [outcome.round, outcome.next_round])
            .collect();
        self.commit(state, checkpoint, &touched, from_sequence, true)?;
        if let Some(outcome) = &finalized {
            self.metrics
                .record_finalization(outcome.path, outcome.winners.is_empty());
        }
        self.refresh_gauges(state);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub async fn game_state(&self) -> GameState {
        let state = self.state.lock().await;
        state.engine.game_state(&state.chain)
    }

    pub async fn can_finalize(&self) -> bool {
        let state = self.state.lock().await;
        state.engine.can_finalize(&state.chain)
    }

    pub async fn head(&self) -> BlockContext {
        self.state.lock().await.chain.current_block()
    }

    pub fn constants(&self) -> GameConstants {
        let rules = &self.config.game;
        let range = rules.bet_range();
        GameConstants {
            min_bet: range.min_bet(),
            max_bet: range.max_bet(),
            blocks_to_wait: rules.blocks_to_wait,
            blockhash_window: rules.blockhash_window,
            unit: range.unit,
        }
    }

    pub async fn round(&self, round: RoundId) -> Option<Round> {
        self.state.lock().await.engine.round(round).cloned()
    }

    pub async fn round_bets(&self, round: RoundId) -> Vec<Bet> {
        self.state.lock().await.engine.round_bets(round)
    }

    pub async fn round_winners(&self, round: RoundId) -> Vec<Address> {
        self.state.lock().await.engine.round_winners(round)
    }

    pub async fn round_winning_number(&self, round: RoundId) -> Amount {
        self.state.lock().await.engine.round_winning_number(round)
    }

    pub async fn player_entry(&self, round: RoundId, player: Address) -> PlayerEntry {
        let state = self.state.lock().await;
        PlayerEntry {
            round,
            player,
            has_played: state.engine.has_played(round, &player),
            amount: state.engine.player_bet(round, &player),
        }
    }

    /// Up to `limit` events starting at `from`
    pub async fn events(&self, from: u64, limit: usize) -> Vec<EventRecord> {
        let state = self.state.lock().await;
        state.engine.events(from).iter().take(limit).cloned().collect()
    }
}
