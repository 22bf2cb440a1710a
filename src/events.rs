//! Game observations
//!
//! Every successful operation appends its events to the `EventJournal` in
//! canonical order. The journal alone is enough to rebuild round history
//! (see `history`).

use crate::types::{Address, Amount, BlockNumber, RoundId};
use serde::{Deserialize, Serialize};

/// One game event, serialized as `{ "<snake_case name>": { ...fields } }`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEvent {
    /// First round opened at initialization
    RoundStarted { round: RoundId, target_block: BlockNumber },
    GuessSubmitted { round: RoundId, player: Address, amount: Amount },
    /// Fallback derivation used; precedes `RoundFinalized`
    EmergencyFinalize { round: RoundId, winning_value: Amount },
    RoundFinalized { round: RoundId, winning_value: Amount, winners_count: u64 },
    WinnersPaid { round: RoundId, winners: Vec<Address>, payout_per_winner: Amount },
    JackpotBurned { round: RoundId, amount: Amount },
    NewRoundStarted { round: RoundId, target_block: BlockNumber },
}

impl GameEvent {
    pub fn round(&self) -> RoundId {
        match self {
            GameEvent::RoundStarted { round, .. }
            | GameEvent::GuessSubmitted { round, .. }
            | GameEvent::EmergencyFinalize { round, .. }
            | GameEvent::RoundFinalized { round, .. }
            | GameEvent::WinnersPaid { round, .. }
            | GameEvent::JackpotBurned { round, .. }
            | GameEvent::NewRoundStarted { round, .. } => *round,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::RoundStarted { .. } => "RoundStarted",
            GameEvent::GuessSubmitted { .. } => "GuessSubmitted",
            GameEvent::EmergencyFinalize { .. } => "EmergencyFinalize",
            GameEvent::RoundFinalized { .. } => "RoundFinalized",
            GameEvent::WinnersPaid { .. } => "WinnersPaid",
            GameEvent::JackpotBurned { .. } => "JackpotBurned",
            GameEvent::NewRoundStarted { .. } => "NewRoundStarted",
        }
    }
}

/// Journaled event with its position and the block it happened in
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub block_number: BlockNumber,
    pub event: GameEvent,
}

/// Append-only event log. Sequences start at 0 and increase by one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventJournal {
    records: Vec<EventRecord>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored records. Returns `None` if sequences are not contiguous from 0.
    pub fn from_records(mut records: Vec<EventRecord>) -> Option<Self> {
        records.sort_by_key(|r| r.sequence);
        let contiguous = records
            .iter()
            .enumerate()
            .all(|(i, record)| record.sequence == i as u64);
        contiguous.then_some(Self { records })
    }

    pub fn next_sequence(&self) -> u64 {
        self.records.len() as u64
    }

    /// Append events in order, all tagged with `block_number`
    pub fn extend<I>(&mut self, block_number: BlockNumber, events: I) -> &[EventRecord]
    where
        I: IntoIterator<Item = GameEvent>,
    {
        let start = self.records.len();
        for event in events {
            let sequence = self.next_sequence();
            self.records.push(EventRecord {
                sequence,
                block_number,
                event,
            });
        }
        &self.records[start..]
    }

    /// Records with `sequence >= from`
    pub fn since(&self, from: u64) -> &[EventRecord] {
        let start = (from as usize).min(self.records.len());
        &self.records[start..]
    }

    /// Drop every record with `sequence >= len`
    pub fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_assigns_contiguous_sequences() {
        let mut journal = EventJournal::new();
        journal.extend(0, [GameEvent::RoundStarted { round: 1, target_block: 5 }]);
        let appended = journal.extend(
            3,
            [
                GameEvent::GuessSubmitted {
                    round: 1,
                    player: Address::repeat_byte(1),
                    amount: 10,
                },
                GameEvent::GuessSubmitted {
                    round: 1,
                    player: Address::repeat_byte(2),
                    amount: 20,
                },
            ],
        );
        assert_eq!(appended.len(), 2);
        assert_eq!(appended[0].sequence, 1);
        assert_eq!(appended[1].block_number, 3);
        assert_eq!(journal.next_sequence(), 3);
        assert_eq!(journal.since(2).len(), 1);
        assert!(journal.since(99).is_empty());
    }

    #[test]
    fn test_from_records_rejects_gaps() {
        let record = |sequence| EventRecord {
            sequence,
            block_number: 0,
            event: GameEvent::JackpotBurned { round: 1, amount: 0 },
        };
        assert!(EventJournal::from_records(vec![record(1), record(0)]).is_some());
        assert!(EventJournal::from_records(vec![record(0), record(2)]).is_none());
    }

    #[test]
    fn test_event_json_is_tagged_by_name() {
        let event = GameEvent::RoundFinalized {
            round: 4,
            winning_value: 25,
            winners_count: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["round_finalized"]["round"], 4);

        let back: GameEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(event.name(), "RoundFinalized");
    }
}
