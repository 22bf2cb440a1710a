//! Persistent round records stored in RocksDB.
//!
//! Key layout:
//! - `round:record:<round_id be>` one JSON `Round` per round
//! - `round:cursor` id of the active round
//! - `event:seq:<sequence be>` one JSON `EventRecord` per journaled event
//! - `chain:window` JSON `SimulatedChain`
//! - `vault:state` JSON `CustodyVault`

use crate::{
    chain::SimulatedChain,
    errors::{NodeError, NodeResult, StorageError},
    events::{EventJournal, EventRecord},
    ledger::{Round, RoundLedger},
    settlement::CustodyVault,
    storage::{OptimizedStorage, StorageBatch},
    types::RoundId,
};
use serde::{de::DeserializeOwned, Serialize};

const ROUND_PREFIX: &[u8] = b"round:record:";
const ROUND_CURSOR_KEY: &[u8] = b"round:cursor";
const EVENT_PREFIX: &[u8] = b"event:seq:";
const CHAIN_KEY: &[u8] = b"chain:window";
const VAULT_KEY: &[u8] = b"vault:state";

const SCAN_PAGE: usize = 512;

/// Everything needed to resume a node
pub struct PersistedState {
    pub ledger: RoundLedger,
    pub journal: EventJournal,
    pub chain: SimulatedChain,
    pub vault: CustodyVault,
}

fn round_key(round_id: RoundId) -> Vec<u8> {
    let mut key = Vec::with_capacity(ROUND_PREFIX.len() + 8);
    key.extend_from_slice(ROUND_PREFIX);
    key.extend_from_slice(&round_id.to_be_bytes());
    key
}

fn event_key(sequence: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(EVENT_PREFIX.len() + 8);
    key.extend_from_slice(EVENT_PREFIX);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn encode<T: Serialize>(value: &T, what: &str) -> NodeResult<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| NodeError::Storage(StorageError::WriteFailed(format!("Failed to encode {}: {}", what, e))))
}

fn decode<T: DeserializeOwned>(bytes: &[u8], what: &str) -> NodeResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| NodeError::Storage(StorageError::CorruptedData(format!("Failed to decode {}: {}", what, e))))
}

fn read_failed(e: rocksdb::Error) -> NodeError {
    NodeError::Storage(StorageError::ReadFailed(e.to_string()))
}

/// Collect every value under `prefix`, paging through the keyspace
fn scan_all(storage: &OptimizedStorage, prefix: &[u8]) -> NodeResult<Vec<Vec<u8>>> {
    let mut values = Vec::new();
    let mut cursor: Option<Vec<u8>> = None;
    loop {
        let rows = storage
            .scan_prefix(prefix, cursor.as_deref(), SCAN_PAGE)
            .map_err(read_failed)?;
        let done = rows.len() < SCAN_PAGE;
        if let Some((key, _)) = rows.last() {
            cursor = Some(key.clone());
        }
        values.extend(rows.into_iter().map(|(_, value)| value));
        if done {
            return Ok(values);
        }
    }
}

/// Changes produced by one successful mutation
#[derive(Default)]
pub struct ChangeSet<'a> {
    pub rounds: Vec<&'a Round>,
    pub cursor: Option<RoundId>,
    pub events: &'a [EventRecord],
    pub chain: Option<&'a SimulatedChain>,
    pub vault: Option<&'a CustodyVault>,
}

/// Write a change set in one atomic batch
pub fn persist(storage: &OptimizedStorage, changes: &ChangeSet<'_>) -> NodeResult<()> {
    let mut batch = StorageBatch::new();

    for round in &changes.rounds {
        batch.put(round_key(round.id), encode(round, &format!("round {}", round.id))?);
    }
    if let Some(cursor) = changes.cursor {
        batch.put(ROUND_CURSOR_KEY, cursor.to_be_bytes());
    }
    for record in changes.events {
        batch.put(event_key(record.sequence), encode(record, &format!("event {}", record.sequence))?);
    }
    if let Some(chain) = changes.chain {
        batch.put(CHAIN_KEY, encode(chain, "chain window")?);
    }
    if let Some(vault) = changes.vault {
        batch.put(VAULT_KEY, encode(vault, "vault state")?);
    }

    if batch.is_empty() {
        return Ok(());
    }
    tracing::trace!("Persisting {} keys", batch.len());
    storage
        .write(batch)
        .map_err(|e| NodeError::Storage(StorageError::WriteFailed(e.to_string())))
}

/// Full snapshot of a node, used on first start
pub fn persist_all(
    storage: &OptimizedStorage,
    ledger: &RoundLedger,
    journal: &EventJournal,
    chain: &SimulatedChain,
    vault: &CustodyVault,
) -> NodeResult<()> {
    persist(
        storage,
        &ChangeSet {
            rounds: ledger.rounds().collect(),
            cursor: Some(ledger.current_id()),
            events: journal.records(),
            chain: Some(chain),
            vault: Some(vault),
        },
    )
}

pub fn load_cursor(storage: &OptimizedStorage) -> NodeResult<Option<RoundId>> {
    let Some(bytes) = storage.get(ROUND_CURSOR_KEY).map_err(read_failed)? else {
        return Ok(None);
    };
    let array: [u8; 8] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| NodeError::Storage(StorageError::CorruptedData("round cursor must be 8 bytes".to_string())))?;
    Ok(Some(RoundId::from_be_bytes(array)))
}

pub fn load_rounds(storage: &OptimizedStorage) -> NodeResult<Vec<Round>> {
    scan_all(storage, ROUND_PREFIX)?
        .iter()
        .map(|bytes| decode(bytes, "round"))
        .collect()
}

fn load_single<T: DeserializeOwned>(storage: &OptimizedStorage, key: &[u8], what: &str) -> NodeResult<Option<T>> {
    match storage.get(key).map_err(read_failed)? {
        Some(bytes) => decode(&bytes, what).map(Some),
        None => Ok(None),
    }
}

/// Load a complete node state, or `None` when nothing has been stored yet
pub fn load_state(storage: &OptimizedStorage) -> NodeResult<Option<PersistedState>> {
    let Some(cursor) = load_cursor(storage)? else {
        return Ok(None);
    };

    let rounds = load_rounds(storage)?;
    let round_count = rounds.len();
    let ledger = RoundLedger::from_parts(rounds, cursor).ok_or_else(|| {
        NodeError::Storage(StorageError::CorruptedData(format!(
            "{} stored rounds do not form a ledger with active round {}",
            round_count, cursor
        )))
    })?;

    let records = scan_all(storage, EVENT_PREFIX)?
        .iter()
        .map(|bytes| decode(bytes, "event"))
        .collect::<NodeResult<Vec<EventRecord>>>()?;
    let journal = EventJournal::from_records(records)
        .ok_or_else(|| NodeError::Storage(StorageError::CorruptedData("event sequence has gaps".to_string())))?;

    let chain: SimulatedChain = load_single(storage, CHAIN_KEY, "chain window")?
        .ok_or_else(|| NodeError::Storage(StorageError::CorruptedData("chain window missing".to_string())))?;
    let vault: CustodyVault = load_single(storage, VAULT_KEY, "vault state")?.unwrap_or_default();

    tracing::info!(
        "Loaded {} rounds, {} events, chain head {} from storage",
        ledger.len(),
        journal.len(),
        chain.head().number
    );

    Ok(Some(PersistedState {
        ledger,
        journal,
        chain,
        vault,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::GameEvent;
    use crate::ledger::Bet;
    use crate::settlement::SettlementExecutor;
    use crate::types::Address;
    use tempfile::TempDir;

    fn open() -> (TempDir, OptimizedStorage) {
        let dir = TempDir::new().unwrap();
        let storage = OptimizedStorage::new(dir.path()).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let (_dir, storage) = open();
        assert!(load_state(&storage).unwrap().is_none());
        assert!(load_rounds(&storage).unwrap().is_empty());
    }

    #[test]
    fn test_full_state_roundtrip() {
        let (_dir, storage) = open();
        let mut chain = SimulatedChain::genesis(b"store", 0, 16);
        chain.mine(3, 2);

        let mut ledger = RoundLedger::new(3, 8);
        let big = 50 * 10u128.pow(18);
        ledger.record_bet(Bet {
            player: Address::repeat_byte(4),
            amount: big,
            timestamp: 6,
        });
        let mut journal = EventJournal::new();
        journal.extend(3, [GameEvent::RoundStarted { round: 1, target_block: 8 }]);
        journal.extend(
            3,
            [GameEvent::GuessSubmitted {
                round: 1,
                player: Address::repeat_byte(4),
                amount: big,
            }],
        );
        let mut vault = CustodyVault::new();
        vault.escrow(&Address::repeat_byte(4), big).unwrap();

        persist_all(&storage, &ledger, &journal, &chain, &vault).unwrap();

        let state = load_state(&storage).unwrap().unwrap();
        assert_eq!(state.ledger, ledger);
        assert_eq!(state.journal, journal);
        assert_eq!(state.chain.head(), chain.head());
        assert_eq!(state.vault, vault);
        assert_eq!(load_cursor(&storage).unwrap(), Some(1));
    }

    #[test]
    fn test_corrupted_round_is_reported() {
        let (_dir, storage) = open();
        let mut batch = StorageBatch::new();
        batch.put(round_key(1), b"not json");
        storage.write(batch).unwrap();
        let err = load_rounds(&storage).unwrap_err();
        assert!(matches!(err, NodeError::Storage(StorageError::CorruptedData(_))));
    }
}
