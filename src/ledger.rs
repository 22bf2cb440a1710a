//! Round storage
//!
//! `RoundLedger` is an explicit store of rounds keyed by id plus a single
//! cursor naming the current round. It enforces storage invariants only;
//! game rules live in the engine.

use crate::types::{Address, Amount, BlockNumber, RoundId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A recorded wager. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub player: Address,
    pub amount: Amount,
    /// Timestamp of the block the bet was accepted in
    pub timestamp: u64,
}

/// Which derivation finalized a round
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizationPath {
    Normal,
    Emergency,
}

/// How the jackpot left custody
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    Paid {
        payout_per_winner: Amount,
        /// Remainder of the even split
        dust: Amount,
    },
    Burned {
        amount: Amount,
    },
}

/// Settlement facts recorded against a finalized round
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub path: FinalizationPath,
    /// Jackpot at the moment of finalization
    pub final_jackpot: Amount,
    pub outcome: SettlementOutcome,
    pub finalized_at_block: BlockNumber,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub target_block: BlockNumber,
    pub opened_at_block: BlockNumber,
    pub jackpot: Amount,
    pub active: bool,
    /// 0 until finalized
    pub winning_value: Amount,
    pub bets: Vec<Bet>,
    pub winners: Vec<Address>,
    pub has_played: BTreeSet<Address>,
    pub settlement: Option<SettlementSummary>,
}

impl Round {
    pub fn open(id: RoundId, opened_at_block: BlockNumber, target_block: BlockNumber) -> Self {
        Self {
            id,
            target_block,
            opened_at_block,
            jackpot: 0,
            active: true,
            winning_value: 0,
            bets: Vec::new(),
            winners: Vec::new(),
            has_played: BTreeSet::new(),
            settlement: None,
        }
    }

    pub fn bet_of(&self, player: &Address) -> Option<&Bet> {
        self.bets.iter().find(|bet| &bet.player == player)
    }

    pub fn total_wagered(&self) -> Amount {
        self.bets.iter().map(|bet| bet.amount).sum()
    }
}

/// Store of all rounds plus the current-round cursor.
///
/// The active round is held apart from the closed ones, so there is always
/// exactly one of it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundLedger {
    closed: BTreeMap<RoundId, Round>,
    current: Round,
}

impl RoundLedger {
    /// Ledger holding round 1, open from `opened_at_block`
    pub fn new(opened_at_block: BlockNumber, target_block: BlockNumber) -> Self {
        Self {
            closed: BTreeMap::new(),
            current: Round::open(1, opened_at_block, target_block),
        }
    }

    /// Rebuild a ledger from stored rounds. The cursor must name the only active round.
    pub fn from_parts(rounds: Vec<Round>, current: RoundId) -> Option<Self> {
        let mut closed = BTreeMap::new();
        let mut active = None;
        for round in rounds {
            if round.active {
                if round.id != current || active.is_some() {
                    return None;
                }
                active = Some(round);
            } else {
                closed.insert(round.id, round);
            }
        }
        let current = active?;
        if closed.keys().any(|id| *id >= current.id) {
            return None;
        }
        Some(Self { closed, current })
    }

    pub fn current_id(&self) -> RoundId {
        self.current.id
    }

    pub fn current(&self) -> &Round {
        &self.current
    }

    pub fn get(&self, id: RoundId) -> Option<&Round> {
        if id == self.current.id {
            Some(&self.current)
        } else {
            self.closed.get(&id)
        }
    }

    /// All rounds in id order, ending with the active one
    pub fn rounds(&self) -> impl Iterator<Item = &Round> {
        self.closed.values().chain(std::iter::once(&self.current))
    }

    pub fn len(&self) -> usize {
        self.closed.len() + 1
    }

    /// Most recently finalized round, if any
    pub fn last_finalized(&self) -> Option<&Round> {
        self.closed.values().next_back()
    }

    pub fn record_bet(&mut self, bet: Bet) {
        let round = &mut self.current;
        round.jackpot += bet.amount;
        round.has_played.insert(bet.player);
        round.bets.push(bet);
    }

    /// Close the current round and open its successor in one step
    pub fn advance(
        &mut self,
        winning_value: Amount,
        winners: Vec<Address>,
        settlement: SettlementSummary,
        next_target_block: BlockNumber,
    ) -> RoundId {
        let next_id = self.current.id + 1;
        let opened_at = settlement.finalized_at_block;
        let mut closing = std::mem::replace(
            &mut self.current,
            Round::open(next_id, opened_at, next_target_block),
        );
        closing.active = false;
        closing.winning_value = winning_value;
        closing.winners = winners;
        closing.jackpot = 0;
        closing.settlement = Some(settlement);
        self.closed.insert(closing.id, closing);
        next_id
    }

    /// Undo the last `advance`, restoring `previous` as the active round.
    /// `previous` must be the round as it was before it was closed.
    pub fn reopen(&mut self, previous: Round) {
        self.closed.remove(&previous.id);
        self.current = previous;
    }
}
