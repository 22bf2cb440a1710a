//! Round history rebuilt from observations alone

use crate::events::{EventRecord, GameEvent};
use crate::types::{Address, Amount, BlockNumber, RoundId};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("{event} at sequence {sequence} refers to unknown round {round}")]
    UnknownRound {
        sequence: u64,
        round: RoundId,
        event: &'static str,
    },

    #[error("{event} at sequence {sequence} arrived after round {round} was finalized")]
    RoundClosed {
        sequence: u64,
        round: RoundId,
        event: &'static str,
    },

    #[error("Round {round} opened twice (sequence {sequence})")]
    DuplicateRound { sequence: u64, round: RoundId },
}

/// One round as seen by an observer of the event stream
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReplayedRound {
    pub round: RoundId,
    pub target_block: BlockNumber,
    pub bets: Vec<(Address, Amount)>,
    /// Running sum of bets while open; 0 once finalized
    pub jackpot: Amount,
    pub final_jackpot: Amount,
    pub finalized: bool,
    pub emergency: bool,
    pub winning_value: Amount,
    pub winners: Vec<Address>,
    pub payout_per_winner: Amount,
    pub burned: Amount,
    pub finalized_at_block: Option<BlockNumber>,
}

impl ReplayedRound {
    fn open(round: RoundId, target_block: BlockNumber) -> Self {
        Self {
            round,
            target_block,
            ..Default::default()
        }
    }

    /// Remainder of the split not delivered through `WinnersPaid`
    pub fn undistributed(&self) -> Amount {
        let paid = self.payout_per_winner * self.winners.len() as Amount;
        self.final_jackpot - paid - self.burned
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoundHistory {
    pub rounds: BTreeMap<RoundId, ReplayedRound>,
    pub current: Option<RoundId>,
}

impl RoundHistory {
    pub fn replay<'a, I>(records: I) -> Result<Self, ReplayError>
    where
        I: IntoIterator<Item = &'a EventRecord>,
    {
        let mut history = RoundHistory::default();
        for record in records {
            history.apply(record)?;
        }
        Ok(history)
    }

    pub fn get(&self, round: RoundId) -> Option<&ReplayedRound> {
        self.rounds.get(&round)
    }

    fn open_round(&mut self, sequence: u64, round: RoundId, target_block: BlockNumber) -> Result<(), ReplayError> {
        if self.rounds.contains_key(&round) {
            return Err(ReplayError::DuplicateRound { sequence, round });
        }
        self.rounds.insert(round, ReplayedRound::open(round, target_block));
        self.current = Some(round);
        Ok(())
    }

    fn round_mut(&mut self, record: &EventRecord, allow_closed: bool) -> Result<&mut ReplayedRound, ReplayError> {
        let round = record.event.round();
        let entry = self.rounds.get_mut(&round).ok_or(ReplayError::UnknownRound {
            sequence: record.sequence,
            round,
            event: record.event.name(),
        })?;
        if entry.finalized && !allow_closed {
            return Err(ReplayError::RoundClosed {
                sequence: record.sequence,
                round,
                event: record.event.name(),
            });
        }
        Ok(entry)
    }

    fn apply(&mut self, record: &EventRecord) -> Result<(), ReplayError> {
        match &record.event {
            GameEvent::RoundStarted { round, target_block } | GameEvent::NewRoundStarted { round, target_block } => {
                self.open_round(record.sequence, *round, *target_block)?;
            }
            GameEvent::GuessSubmitted { player, amount, .. } => {
                let entry = self.round_mut(record, false)?;
                entry.bets.push((*player, *amount));
                entry.jackpot += amount;
            }
            GameEvent::EmergencyFinalize { winning_value, .. } => {
                let entry = self.round_mut(record, false)?;
                entry.emergency = true;
                entry.winning_value = *winning_value;
            }
            GameEvent::RoundFinalized { winning_value, .. } => {
                let block = record.block_number;
                let entry = self.round_mut(record, false)?;
                entry.finalized = true;
                entry.winning_value = *winning_value;
                entry.final_jackpot = entry.jackpot;
                entry.jackpot = 0;
                entry.finalized_at_block = Some(block);
            }
            GameEvent::WinnersPaid {
                winners,
                payout_per_winner,
                ..
            } => {
                let entry = self.round_mut(record, true)?;
                entry.winners = winners.clone();
                entry.payout_per_winner = *payout_per_winner;
            }
            GameEvent::JackpotBurned { amount, .. } => {
                let entry = self.round_mut(record, true)?;
                entry.burned = *amount;
            }
        }
        Ok(())
    }
}
