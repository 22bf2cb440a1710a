//! Round engine
//!
//! The state machine of the game. A round is Open while the chain is below
//! its target block, Finalizable from the target block on, and Finalized once
//! settled; finalizing a round opens the next one in the same step.
//!
//! Every mutating operation is all-or-nothing. Finalization commits the ledger
//! rollover before handing the settlement plan to the executor, and restores
//! the closed round if the executor fails.

use crate::chain::{BlockContext, ChainView};
use crate::config::GameRules;
use crate::errors::RoundError;
use crate::events::{EventJournal, EventRecord, GameEvent};
use crate::ledger::{Bet, FinalizationPath, Round, RoundLedger, SettlementOutcome, SettlementSummary};
use crate::randomness::{emergency_seed, RandomnessSource};
use crate::settlement::{SettlementExecutor, SettlementPlan};
use crate::types::{Address, Amount, BetRange, BlockNumber, RoundId};
use serde::Serialize;

/// Snapshot of the current round as a client sees it
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GameState {
    pub current_round: RoundId,
    pub target_block: BlockNumber,
    pub current_block: BlockNumber,
    pub blocks_remaining: u64,
    pub jackpot: Amount,
    pub bet_count: usize,
    pub round_active: bool,
    pub can_finalize: bool,
    /// Target hash has left the window; only emergency finalization remains
    pub emergency_required: bool,
    /// Winning value of the most recently finalized round, 0 if none
    pub last_winning_value: Amount,
    pub min_bet: Amount,
    pub max_bet: Amount,
    pub blocks_to_wait: u64,
}

/// Accepted wager
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BetReceipt {
    pub round: RoundId,
    pub player: Address,
    pub amount: Amount,
    pub jackpot: Amount,
    pub timestamp: u64,
}

/// Result of a successful finalization
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FinalizeOutcome {
    pub round: RoundId,
    pub path: FinalizationPath,
    pub winning_value: Amount,
    pub winners: Vec<Address>,
    pub final_jackpot: Amount,
    pub payout_per_winner: Amount,
    pub dust: Amount,
    pub burned: Amount,
    pub next_round: RoundId,
    pub next_target_block: BlockNumber,
    pub events: Vec<EventRecord>,
}

/// Engine state touched by a single bet or finalization
#[derive(Clone, Debug)]
pub struct EngineCheckpoint<S> {
    current: Round,
    journal_len: usize,
    executor: S,
}

pub struct RoundEngine<R, S> {
    rules: GameRules,
    range: BetRange,
    ledger: RoundLedger,
    journal: EventJournal,
    randomness: R,
    executor: S,
}

impl<R, S> RoundEngine<R, S>
where
    R: RandomnessSource,
    S: SettlementExecutor,
{
    /// Open round 1 with `target = current + blocks_to_wait`
    pub fn new<C: ChainView>(rules: GameRules, chain: &C, randomness: R, executor: S) -> Self {
        let block = chain.current_block();
        let target_block = block.number + rules.blocks_to_wait;
        let ledger = RoundLedger::new(block.number, target_block);
        let mut journal = EventJournal::new();
        journal.extend(block.number, [GameEvent::RoundStarted { round: 1, target_block }]);

        tracing::info!("Round 1 opened at block {}, target block {}", block.number, target_block);

        Self {
            range: rules.bet_range(),
            rules,
            ledger,
            journal,
            randomness,
            executor,
        }
    }

    /// Resume from previously persisted state
    pub fn restore(rules: GameRules, ledger: RoundLedger, journal: EventJournal, randomness: R, executor: S) -> Self {
        tracing::info!(
            "Restored round engine at round {} with {} events",
            ledger.current_id(),
            journal.len()
        );
        Self {
            range: rules.bet_range(),
            rules,
            ledger,
            journal,
            randomness,
            executor,
        }
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    pub fn submit_bet<C: ChainView>(
        &mut self,
        player: Address,
        amount: Amount,
        chain: &C,
    ) -> Result<BetReceipt, RoundError> {
        let block = chain.current_block();
        let round = self.ledger.current();

        if block.number >= round.target_block {
            return Err(RoundError::BettingClosed {
                round: round.id,
                target_block: round.target_block,
                current_block: block.number,
            });
        }
        if !self.range.contains(amount) {
            return Err(RoundError::InvalidBetAmount {
                amount,
                min: self.range.min_bet(),
                max: self.range.max_bet(),
            });
        }
        if round.has_played.contains(&player) {
            return Err(RoundError::AlreadyPlayed { round: round.id, player });
        }

        let round_id = round.id;
        self.executor
            .escrow(&player, amount)
            .map_err(|e| RoundError::DepositRejected {
                player,
                amount,
                reason: e.to_string(),
            })?;

        self.ledger.record_bet(Bet {
            player,
            amount,
            timestamp: block.timestamp,
        });
        self.journal.extend(
            block.number,
            [GameEvent::GuessSubmitted { round: round_id, player, amount }],
        );

        let jackpot = self.ledger.current().jackpot;
        tracing::debug!("Bet of {} from {} accepted in round {} (jackpot {})", amount, player, round_id, jackpot);

        Ok(BetReceipt {
            round: round_id,
            player,
            amount,
            jackpot,
            timestamp: block.timestamp,
        })
    }

    /// Finalize the current round through the target block's hash
    pub fn finalize<C: ChainView>(&mut self, chain: &C) -> Result<FinalizeOutcome, RoundError> {
        self.finalize_round(self.implicit_round(chain), chain)
    }

    /// Round an id-less finalize call refers to.
    ///
    /// While the current round is still before its target block, a repeated
    /// call is aimed at the round that was just finalized, so it resolves to
    /// the predecessor and fails with `RoundAlreadyFinalized`. Round 1 has no
    /// predecessor and stays on itself.
    pub fn implicit_round<C: ChainView>(&self, chain: &C) -> RoundId {
        let current = self.ledger.current();
        if current.id > 1 && chain.current_number() < current.target_block {
            current.id - 1
        } else {
            current.id
        }
    }

    pub fn finalize_round<C: ChainView>(&mut self, round_id: RoundId, chain: &C) -> Result<FinalizeOutcome, RoundError> {
        self.ensure_current(round_id)?;
        let block = chain.current_block();
        let target_block = self.ledger.current().target_block;

        if block.number < target_block {
            return Err(RoundError::CannotFinalizeYet {
                round: round_id,
                target_block,
                current_block: block.number,
            });
        }
        let unavailable = RoundError::BlockhashUnavailable {
            round: round_id,
            target_block,
            current_block: block.number,
        };
        if block.number - target_block >= self.rules.blockhash_window {
            return Err(unavailable);
        }
        let seed = chain.block_hash(target_block).ok_or(unavailable)?;

        let winning_value = self.randomness.winning_value(&seed, round_id, &self.range);
        self.settle_current(FinalizationPath::Normal, winning_value, &block)
    }

    /// Finalize the current round after its target hash has expired
    pub fn emergency_finalize<C: ChainView>(&mut self, chain: &C) -> Result<FinalizeOutcome, RoundError> {
        self.emergency_finalize_round(self.implicit_round(chain), chain)
    }

    pub fn emergency_finalize_round<C: ChainView>(
        &mut self,
        round_id: RoundId,
        chain: &C,
    ) -> Result<FinalizeOutcome, RoundError> {
        self.ensure_current(round_id)?;
        let block = chain.current_block();
        let target_block = self.ledger.current().target_block;

        if block.number < target_block || block.number - target_block < self.rules.blockhash_window {
            return Err(RoundError::CannotFinalizeYet {
                round: round_id,
                target_block,
                current_block: block.number,
            });
        }

        let seed = emergency_seed(&block);
        let winning_value = self.randomness.winning_value(&seed, round_id, &self.range);
        tracing::warn!(
            "Emergency finalization of round {} at block {} (target {} expired)",
            round_id,
            block.number,
            target_block
        );
        self.settle_current(FinalizationPath::Emergency, winning_value, &block)
    }

    fn ensure_current(&self, round_id: RoundId) -> Result<(), RoundError> {
        let current = self.ledger.current_id();
        if round_id == current {
            Ok(())
        } else if round_id != 0 && round_id < current {
            Err(RoundError::RoundAlreadyFinalized { round: round_id })
        } else {
            Err(RoundError::RoundNotActive { round: round_id })
        }
    }

    fn settle_current(
        &mut self,
        path: FinalizationPath,
        winning_value: Amount,
        block: &BlockContext,
    ) -> Result<FinalizeOutcome, RoundError> {
        let snapshot = self.ledger.current().clone();
        let round_id = snapshot.id;
        let jackpot = snapshot.jackpot;
        let winners: Vec<Address> = snapshot
            .bets
            .iter()
            .filter(|bet| bet.amount == winning_value)
            .map(|bet| bet.player)
            .collect();

        let plan = SettlementPlan::build(round_id, jackpot, &winners, self.rules.dust_policy);
        let (payout_per_winner, dust) = match &plan {
            SettlementPlan::Payout {
                payout_per_winner, dust, ..
            } => (*payout_per_winner, *dust),
            SettlementPlan::Burn { .. } => (0, 0),
        };
        let outcome = if winners.is_empty() {
            SettlementOutcome::Burned { amount: jackpot }
        } else {
            SettlementOutcome::Paid { payout_per_winner, dust }
        };
        let next_target_block = block.number + self.rules.blocks_to_wait;

        // Commit the rollover before any value moves
        let next_round = self.ledger.advance(
            winning_value,
            winners.clone(),
            SettlementSummary {
                path,
                final_jackpot: jackpot,
                outcome,
                finalized_at_block: block.number,
            },
            next_target_block,
        );

        if let Err(err) = self.executor.settle(&plan) {
            self.ledger.reopen(snapshot);
            tracing::warn!("Settlement of round {} failed, round stays open: {}", round_id, err);
            return Err(RoundError::PayoutFailed {
                round: round_id,
                recipient: err.recipient(),
                reason: err.to_string(),
            });
        }

        let mut events = Vec::with_capacity(4);
        if path == FinalizationPath::Emergency {
            events.push(GameEvent::EmergencyFinalize { round: round_id, winning_value });
        }
        events.push(GameEvent::RoundFinalized {
            round: round_id,
            winning_value,
            winners_count: winners.len() as u64,
        });
        if winners.is_empty() {
            events.push(GameEvent::JackpotBurned { round: round_id, amount: jackpot });
        } else {
            events.push(GameEvent::WinnersPaid {
                round: round_id,
                winners: winners.clone(),
                payout_per_winner,
            });
        }
        events.push(GameEvent::NewRoundStarted {
            round: next_round,
            target_block: next_target_block,
        });
        let records = self.journal.extend(block.number, events).to_vec();

        tracing::info!(
            "Round {} finalized at block {}: winning value {}, {} winner(s), jackpot {}; round {} targets block {}",
            round_id,
            block.number,
            winning_value,
            winners.len(),
            jackpot,
            next_round,
            next_target_block
        );

        Ok(FinalizeOutcome {
            round: round_id,
            path,
            winning_value,
            final_jackpot: jackpot,
            burned: plan.burned(),
            winners,
            payout_per_winner,
            dust,
            next_round,
            next_target_block,
            events: records,
        })
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn game_state<C: ChainView>(&self, chain: &C) -> GameState {
        let current_block = chain.current_number();
        let round = self.ledger.current();
        let blocks_remaining = round.target_block.saturating_sub(current_block);

        GameState {
            current_round: round.id,
            target_block: round.target_block,
            current_block,
            blocks_remaining,
            jackpot: round.jackpot,
            bet_count: round.bets.len(),
            round_active: round.active,
            can_finalize: round.active && blocks_remaining == 0,
            emergency_required: self.emergency_required(chain),
            last_winning_value: self.ledger.last_finalized().map(|r| r.winning_value).unwrap_or(0),
            min_bet: self.range.min_bet(),
            max_bet: self.range.max_bet(),
            blocks_to_wait: self.rules.blocks_to_wait,
        }
    }

    /// True iff the current round is active and its target block has been reached
    pub fn can_finalize<C: ChainView>(&self, chain: &C) -> bool {
        let round = self.ledger.current();
        round.active && chain.current_number() >= round.target_block
    }

    /// True once only the emergency path can finalize the current round
    pub fn emergency_required<C: ChainView>(&self, chain: &C) -> bool {
        let target = self.ledger.current().target_block;
        chain
            .current_number()
            .checked_sub(target)
            .map(|elapsed| elapsed >= self.rules.blockhash_window)
            .unwrap_or(false)
    }

    pub fn round_bets(&self, round_id: RoundId) -> Vec<Bet> {
        self.ledger.get(round_id).map(|r| r.bets.clone()).unwrap_or_default()
    }

    /// Amount wagered by `player` in `round_id`, 0 if none
    pub fn player_bet(&self, round_id: RoundId, player: &Address) -> Amount {
        self.ledger
            .get(round_id)
            .and_then(|r| r.bet_of(player))
            .map(|bet| bet.amount)
            .unwrap_or(0)
    }

    pub fn has_played(&self, round_id: RoundId, player: &Address) -> bool {
        self.ledger
            .get(round_id)
            .map(|r| r.has_played.contains(player))
            .unwrap_or(false)
    }

    pub fn round_winners(&self, round_id: RoundId) -> Vec<Address> {
        self.ledger.get(round_id).map(|r| r.winners.clone()).unwrap_or_default()
    }

    pub fn round_winning_number(&self, round_id: RoundId) -> Amount {
        self.ledger.get(round_id).map(|r| r.winning_value).unwrap_or(0)
    }

    pub fn round(&self, round_id: RoundId) -> Option<&Round> {
        self.ledger.get(round_id)
    }

    /// Journaled events with `sequence >= from`
    pub fn events(&self, from: u64) -> &[EventRecord] {
        self.journal.since(from)
    }

    pub fn current_round(&self) -> RoundId {
        self.ledger.current_id()
    }

    pub fn jackpot(&self) -> Amount {
        self.ledger.current().jackpot
    }

    pub fn round_active(&self) -> bool {
        self.ledger.current().active
    }

    /// Winning value of the current round; 0 while it is active
    pub fn winning_number(&self) -> Amount {
        self.ledger.current().winning_value
    }

    pub fn target_block(&self) -> BlockNumber {
        self.ledger.current().target_block
    }

    pub fn min_bet(&self) -> Amount {
        self.range.min_bet()
    }

    pub fn max_bet(&self) -> Amount {
        self.range.max_bet()
    }

    pub fn blocks_to_wait(&self) -> u64 {
        self.rules.blocks_to_wait
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn ledger(&self) -> &RoundLedger {
        &self.ledger
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    pub fn executor(&self) -> &S {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut S {
        &mut self.executor
    }
}

impl<R, S> RoundEngine<R, S>
where
    R: RandomnessSource,
    S: SettlementExecutor + Clone,
{
    pub fn checkpoint(&self) -> EngineCheckpoint<S> {
        EngineCheckpoint {
            current: self.ledger.current().clone(),
            journal_len: self.journal.len(),
            executor: self.executor.clone(),
        }
    }

    /// Undo the mutations made since `checkpoint` was taken.
    /// At most one finalization may lie between the two.
    pub fn rollback(&mut self, checkpoint: EngineCheckpoint<S>) {
        tracing::warn!(
            "Rolling round engine back to round {} with {} events",
            checkpoint.current.id,
            checkpoint.journal_len
        );
        self.ledger.reopen(checkpoint.current);
        self.journal.truncate(checkpoint.journal_len);
        self.executor = checkpoint.executor;
    }
}
